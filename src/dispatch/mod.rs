//! Handoff of recording-ready jobs to the external transcription worker.
//!
//! The worker only acknowledges the job here; the transcript itself arrives
//! later through the callback endpoint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

mod client;
mod task;

pub use client::HttpDispatchClient;
pub use task::spawn_dispatch;

use crate::transcript::TranscriptRecord;

/// Job body posted to the worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchJob {
    pub download_url: String,
    pub booking_uid: String,
    pub title: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub callback_url: String,
}

impl DispatchJob {
    pub fn for_record(record: &TranscriptRecord, download_url: &str, callback_url: &str) -> Self {
        Self {
            download_url: download_url.to_string(),
            booking_uid: record.external_booking_id.clone(),
            title: record.title.clone(),
            start_time: record.start_time,
            end_time: record.end_time,
            client_name: record.client_name.clone(),
            client_email: record.client_email.clone(),
            callback_url: callback_url.to_string(),
        }
    }
}

/// Worker acceptance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchAck {
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("worker rejected job with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("worker unreachable: {0}")]
    Transport(String),
}

#[async_trait]
pub trait TranscriptDispatcher: Send + Sync {
    async fn dispatch(&self, job: &DispatchJob) -> Result<DispatchAck, DispatchError>;
}
