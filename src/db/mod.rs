//! Durable transcript storage.

pub mod init;
pub mod store;
pub mod transcripts;


pub use init::{migrate, open_db};
pub use store::{SqliteTranscriptStore, TranscriptStore, UpsertOutcome};
pub use transcripts::TranscriptRepository;
