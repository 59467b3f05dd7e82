//! Acknowledgment returned by the webhook, callback and retry handlers.

use serde::Serialize;

use crate::transcript::{TranscriptRecord, TranscriptStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Created,
    Updated,
    Dispatched,
    Duplicate,
    Ignored,
    NoOp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TranscriptStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Ack {
    pub fn for_record(action: Action, record: &TranscriptRecord) -> Self {
        Self {
            action,
            transcript_id: Some(record.id.clone()),
            status: Some(record.status),
            detail: None,
        }
    }

    pub fn bare(action: Action, detail: impl Into<String>) -> Self {
        Self {
            action,
            transcript_id: None,
            status: None,
            detail: Some(detail.into()),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
