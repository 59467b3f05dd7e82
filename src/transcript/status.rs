//! Transcript lifecycle states and the transition rules enforced by every
//! component that mutates a record.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status of a transcript record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TranscriptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for TranscriptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is asking for the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// Platform webhook handlers.
    Webhook,
    /// Transcription worker callback.
    Worker,
    /// Operator-triggered retry.
    Retry,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::Worker => "worker",
            Self::Retry => "retry",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("{actor} may not move a transcript from {from} to {to}")]
    NotAllowed {
        actor: &'static str,
        from: TranscriptStatus,
        to: TranscriptStatus,
    },
    #[error("a transcript cannot be completed without transcript text")]
    EmptyTranscript,
}

/// Snapshot of the parts of a record the rules look at.
#[derive(Debug, Clone, Copy)]
pub struct Lifecycle {
    pub status: TranscriptStatus,
    pub has_transcript: bool,
}

impl Lifecycle {
    pub fn new(status: TranscriptStatus, has_transcript: bool) -> Self {
        Self {
            status,
            has_transcript,
        }
    }

    /// `completed` reached through the MEETING_ENDED fallback, with no text yet.
    pub fn is_provisional_completion(&self) -> bool {
        self.status == TranscriptStatus::Completed && !self.has_transcript
    }

    pub fn check(&self, to: TranscriptStatus, actor: Actor) -> Result<(), TransitionError> {
        use TranscriptStatus::*;

        let from = self.status;
        let allowed = match actor {
            Actor::Webhook => match (from, to) {
                (Pending | Processing | Failed, Cancelled) => true,
                (Pending, Completed) => true,
                (Pending | Processing, Processing) => true,
                (Completed, Processing) => self.is_provisional_completion(),
                (Processing, Failed) => true,
                _ => false,
            },
            Actor::Worker => match (from, to) {
                (Pending | Processing | Failed, Completed) => true,
                (Completed, Completed) => true,
                (Pending | Processing | Failed, Failed) => true,
                _ => false,
            },
            Actor::Retry => match (from, to) {
                (Pending | Processing | Failed, Processing) => true,
                (Completed, Processing) => self.is_provisional_completion(),
                (Processing, Completed | Failed) => true,
                _ => false,
            },
        };

        if allowed {
            Ok(())
        } else {
            Err(TransitionError::NotAllowed {
                actor: actor.as_str(),
                from,
                to,
            })
        }
    }

    /// Check a move to `completed` that delivers `text`.
    pub fn check_completion(&self, actor: Actor, text: &str) -> Result<(), TransitionError> {
        if text.trim().is_empty() {
            return Err(TransitionError::EmptyTranscript);
        }
        self.check(TranscriptStatus::Completed, actor)
    }
}
