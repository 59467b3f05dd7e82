//! Transcript records and their lifecycle.

pub mod record;
pub mod status;

pub use record::{append_note, failure_note, BookingUpsert, TranscriptRecord, TranscriptUpdate};
pub use status::{Actor, Lifecycle, TranscriptStatus, TransitionError};
