//! Operator-triggered recovery of a transcript through the platform API.
//!
//! Instead of waiting for the worker, the orchestrator pulls whatever
//! transcript the platform itself produced for the booking's latest
//! recording. Every attempt ends with the record in `completed` or `failed`;
//! failures carry a `[code] message` note so operators can tell a recording
//! that is not ready yet from an unreachable platform.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

pub mod artifact;
pub mod platform;

pub use artifact::{rank_artifacts, ArtifactFormat, ArtifactParser, ParsedTranscript, TranscriptArtifact};
pub use platform::{latest_recording, CalPlatformClient, PlatformApi, PlatformBooking, PlatformRecording};

use crate::db::TranscriptStore;
use crate::error::{PipelineError, PipelineResult};
use crate::transcript::{
    append_note, failure_note, Actor, TranscriptRecord, TranscriptStatus, TranscriptUpdate,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetryError {
    #[error("booking {0} is not listed by the platform")]
    BookingNotListed(String),
    #[error("the platform has no recordings for this booking")]
    NoRecordings,
    #[error("latest recording is {0}, not finished")]
    RecordingNotReady(String),
    #[error("no transcript artifact for recording {0}")]
    NoTranscript(String),
    #[error("transcript artifact contains no text")]
    EmptyTranscript,
    #[error("unreadable transcript artifact: {0}")]
    InvalidArtifact(String),
    #[error("artifact download failed: {0}")]
    DownloadFailed(String),
    #[error("platform request failed: {0}")]
    Upstream(String),
}

impl RetryError {
    /// Reason code written into notes and returned to the operator.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BookingNotListed(_) => "booking_not_listed",
            Self::NoRecordings => "no_recordings",
            Self::RecordingNotReady(_) => "recording_not_ready",
            Self::NoTranscript(_) => "no_transcript",
            Self::EmptyTranscript => "empty_transcript",
            Self::InvalidArtifact(_) => "invalid_artifact",
            Self::DownloadFailed(_) => "download_failed",
            Self::Upstream(_) => "upstream",
        }
    }

    /// The platform answered, but has nothing usable yet.
    pub fn is_partial_data(&self) -> bool {
        matches!(
            self,
            Self::NoRecordings
                | Self::RecordingNotReady(_)
                | Self::NoTranscript(_)
                | Self::EmptyTranscript
                | Self::InvalidArtifact(_)
        )
    }
}

impl From<RetryError> for PipelineError {
    fn from(err: RetryError) -> Self {
        if err.is_partial_data() {
            PipelineError::PartialData(err.to_string())
        } else {
            PipelineError::Upstream(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryOutcome {
    pub transcript_id: String,
    pub status: TranscriptStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `partial_data_failure` or `upstream_failure`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

struct Fetched {
    recording_url: Option<String>,
    transcript: ParsedTranscript,
}

pub struct RetryOrchestrator {
    store: Arc<dyn TranscriptStore>,
    platform: Arc<dyn PlatformApi>,
    parser: ArtifactParser,
}

impl RetryOrchestrator {
    pub fn new(store: Arc<dyn TranscriptStore>, platform: Arc<dyn PlatformApi>) -> Result<Self> {
        Ok(Self {
            store,
            platform,
            parser: ArtifactParser::new()?,
        })
    }

    /// Run one full attempt. Platform-side problems end in a `failed` outcome,
    /// not an error; errors are reserved for requests that cannot start.
    pub async fn retry(&self, transcript_id: &str) -> PipelineResult<RetryOutcome> {
        let record = self
            .store
            .find_by_id(transcript_id)
            .await?
            .ok_or_else(|| PipelineError::not_found(format!("transcript {} not found", transcript_id)))?;

        let booking_uid = record.external_booking_id.trim().to_string();
        if booking_uid.is_empty() {
            return Err(PipelineError::validation(format!(
                "transcript {} has no booking id",
                record.id
            )));
        }

        record
            .lifecycle()
            .check(TranscriptStatus::Processing, Actor::Retry)?;

        let update = TranscriptUpdate::transition(record.status, TranscriptStatus::Processing);
        let processing = self.store.update(&record.id, update).await?.ok_or_else(|| {
            PipelineError::Internal(anyhow!("transcript {} changed before retry started", record.id))
        })?;
        info!("Retrying transcript {} (booking {})", processing.id, booking_uid);

        match self.fetch(&booking_uid).await {
            Ok(fetched) => self.complete(&processing, fetched).await,
            Err(e) => Ok(self.fail(&processing, &e).await),
        }
    }

    async fn fetch(&self, booking_uid: &str) -> Result<Fetched, RetryError> {
        let bookings = self.platform.list_bookings().await?;
        let booking = bookings
            .into_iter()
            .find(|b| b.uid == booking_uid)
            .ok_or_else(|| RetryError::BookingNotListed(booking_uid.to_string()))?;

        let recordings = self.platform.list_recordings(booking.id).await?;
        let recording = latest_recording(&recordings).ok_or(RetryError::NoRecordings)?;
        if !recording.is_finished() {
            return Err(RetryError::RecordingNotReady(
                recording.status.clone().unwrap_or_else(|| "unknown".to_string()),
            ));
        }

        let artifacts = self
            .platform
            .list_transcripts(booking.id, &recording.id)
            .await?;
        let recording_url = recording
            .download_link
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from);

        // The first failure is the one reported when no format works out
        let mut first_error = None;
        for (format, artifact) in rank_artifacts(&artifacts) {
            match self.read_artifact(format, artifact).await {
                Ok(transcript) => {
                    return Ok(Fetched {
                        recording_url,
                        transcript,
                    })
                }
                Err(e @ RetryError::Upstream(_)) => return Err(e),
                Err(e) => {
                    warn!(
                        "Skipping {:?} artifact of recording {}: {}",
                        format, recording.id, e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        Err(first_error.unwrap_or_else(|| RetryError::NoTranscript(recording.id.clone())))
    }

    async fn read_artifact(
        &self,
        format: ArtifactFormat,
        artifact: &TranscriptArtifact,
    ) -> Result<ParsedTranscript, RetryError> {
        let body = self.platform.download(&artifact.link).await?;
        let transcript = self.parser.parse(format, &body)?;
        if transcript.text.trim().is_empty() {
            return Err(RetryError::EmptyTranscript);
        }
        Ok(transcript)
    }

    async fn complete(
        &self,
        record: &TranscriptRecord,
        fetched: Fetched,
    ) -> PipelineResult<RetryOutcome> {
        let text = fetched.transcript.text;
        record.lifecycle().check_completion(Actor::Retry, &text)?;

        let mut update =
            TranscriptUpdate::transition(TranscriptStatus::Processing, TranscriptStatus::Completed)
                .with_transcript(text, fetched.transcript.structured);
        if let Some(url) = fetched.recording_url {
            update = update.with_recording_url(url);
        }

        let updated = self.store.update(&record.id, update).await?.ok_or_else(|| {
            PipelineError::Internal(anyhow!(
                "transcript {} changed while retry was running",
                record.id
            ))
        })?;

        info!("Retry completed transcript {}", updated.id);
        Ok(RetryOutcome {
            transcript_id: updated.id,
            status: TranscriptStatus::Completed,
            reason: None,
            error: None,
            error_kind: None,
        })
    }

    async fn fail(&self, record: &TranscriptRecord, err: &RetryError) -> RetryOutcome {
        let message = err.to_string();
        let kind = PipelineError::from(err.clone()).kind();
        warn!(
            "Retry of transcript {} failed ({}): [{}] {}",
            record.id,
            kind,
            err.code(),
            message
        );

        let note = append_note(record.notes.as_deref(), &failure_note(err.code(), &message));
        let update =
            TranscriptUpdate::transition(TranscriptStatus::Processing, TranscriptStatus::Failed)
                .with_notes(note);

        match self.store.update(&record.id, update).await {
            Ok(Some(_)) => {}
            Ok(None) => warn!(
                "Transcript {} left processing before retry failure was recorded",
                record.id
            ),
            Err(e) => error!(
                "Failed to record retry failure for transcript {}: {:#}",
                record.id, e
            ),
        }

        RetryOutcome {
            transcript_id: record.id.clone(),
            status: TranscriptStatus::Failed,
            reason: Some(err.code().to_string()),
            error: Some(message),
            error_kind: Some(kind),
        }
    }
}
