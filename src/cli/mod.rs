pub mod args;
pub mod retry;
pub mod transcripts;

pub use args::{Cli, CliCommand, RetryCliArgs, TranscriptsCliArgs, TranscriptsCommand};
pub use retry::handle_retry_command;
pub use transcripts::handle_transcripts_command;
