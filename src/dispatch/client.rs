//! HTTP client for the transcription worker's jobs endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{DispatchAck, DispatchError, DispatchJob, TranscriptDispatcher};
use crate::config::WorkerConfig;

/// Rejection bodies are kept in notes, so cap them.
const MAX_BODY_IN_ERROR: usize = 300;

#[derive(Debug, Deserialize)]
struct SubmitJobResponse {
    #[serde(rename = "jobId", alias = "id")]
    job_id: Option<String>,
}

pub struct HttpDispatchClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpDispatchClient {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    pub fn from_config(config: &WorkerConfig) -> Result<Self, DispatchError> {
        Self::new(&config.endpoint, config.api_key.clone(), config.timeout())
    }
}

#[async_trait]
impl TranscriptDispatcher for HttpDispatchClient {
    async fn dispatch(&self, job: &DispatchJob) -> Result<DispatchAck, DispatchError> {
        let mut request = self.client.post(&self.endpoint).json(job);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body: truncate(&body, MAX_BODY_IN_ERROR),
            });
        }

        // Any 2xx is acceptance; the job id is informational
        let job_id = serde_json::from_str::<SubmitJobResponse>(&body)
            .ok()
            .and_then(|r| r.job_id);
        debug!(
            "Worker accepted job for booking {} ({:?})",
            job.booking_uid, job_id
        );

        Ok(DispatchAck { job_id })
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
