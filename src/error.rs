//! Failure taxonomy shared by the webhook, callback and retry paths.

use thiserror::Error;

use crate::transcript::TransitionError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or invalid signature. Never retried by this service.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The caller sent a payload without the fields we need.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// Platform API or worker unreachable or answered non-2xx.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Upstream answered but the data is not usable yet.
    #[error("incomplete upstream data: {0}")]
    PartialData(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "authentication_failure",
            Self::Validation(_) => "validation_failure",
            Self::NotFound(_) => "not_found",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::Upstream(_) => "upstream_failure",
            Self::PartialData(_) => "partial_data_failure",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
