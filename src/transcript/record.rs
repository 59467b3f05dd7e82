//! Transcript record types shared by the store and the handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{Lifecycle, TranscriptStatus};

/// One transcript record per scheduled meeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptRecord {
    pub id: String,
    pub external_booking_id: String,
    pub status: TranscriptStatus,
    pub title: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub host_name: Option<String>,
    pub host_email: Option<String>,
    pub meeting_link: Option<String>,
    pub recording_url: Option<String>,
    pub transcript_text: Option<String>,
    pub transcript_structured: Option<serde_json::Value>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TranscriptRecord {
    pub fn has_transcript(&self) -> bool {
        self.transcript_text
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::new(self.status, self.has_transcript())
    }
}

/// Booking metadata written by BOOKING_CREATED. Replays refresh these fields
/// but never touch status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingUpsert {
    pub external_booking_id: String,
    pub title: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub host_name: Option<String>,
    pub host_email: Option<String>,
    pub meeting_link: Option<String>,
}

/// Partial update. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptUpdate {
    pub status: Option<TranscriptStatus>,
    pub end_time: Option<DateTime<Utc>>,
    pub recording_url: Option<String>,
    pub transcript_text: Option<String>,
    pub transcript_structured: Option<serde_json::Value>,
    pub notes: Option<String>,
    /// Only apply when the stored status still equals this value.
    pub expected_status: Option<TranscriptStatus>,
}

impl TranscriptUpdate {
    /// Move from `from` to `to`, guarded on the status the caller observed.
    pub fn transition(from: TranscriptStatus, to: TranscriptStatus) -> Self {
        Self {
            status: Some(to),
            expected_status: Some(from),
            ..Default::default()
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_recording_url(mut self, url: impl Into<String>) -> Self {
        self.recording_url = Some(url.into());
        self
    }

    pub fn with_transcript(
        mut self,
        text: impl Into<String>,
        structured: Option<serde_json::Value>,
    ) -> Self {
        self.transcript_text = Some(text.into());
        self.transcript_structured = structured;
        self
    }
}

/// Machine-readable failure note: `[code] message`.
pub fn failure_note(code: &str, message: &str) -> String {
    format!("[{}] {}", code, message)
}

/// Append `line` to existing notes on a new line.
pub fn append_note(existing: Option<&str>, line: &str) -> String {
    match existing.map(str::trim_end).filter(|n| !n.is_empty()) {
        Some(notes) => format!("{}\n{}", notes, line),
        None => line.to_string(),
    }
}
