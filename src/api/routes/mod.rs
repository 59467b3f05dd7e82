pub mod transcripts;
pub mod webhooks;
