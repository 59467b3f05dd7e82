//! Operator endpoints: retry and read-only record views.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::retry::RetryOutcome;
use crate::transcript::TranscriptRecord;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRequest {
    pub transcript_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListQueryParams {
    /// Maximum results (default 20)
    pub limit: Option<usize>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/transcripts", get(list_transcripts))
        .route("/transcripts/retry", post(retry_transcript))
        .route("/transcripts/:id", get(get_transcript))
        .with_state(state)
}

/// POST /transcripts/retry - Pull the transcript from the platform.
///
/// Holds the request open for the whole attempt, including the artifact
/// download.
async fn retry_transcript(
    State(state): State<AppState>,
    payload: Result<Json<RetryRequest>, JsonRejection>,
) -> ApiResult<Json<RetryOutcome>> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let transcript_id = request
        .transcript_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("transcriptId is required"))?;

    info!("Retry requested for transcript {}", transcript_id);
    let outcome = state.retry.retry(transcript_id).await?;
    Ok(Json(outcome))
}

/// GET /transcripts - Most recent records first.
async fn list_transcripts(
    State(state): State<AppState>,
    Query(params): Query<ListQueryParams>,
) -> ApiResult<Json<Vec<TranscriptRecord>>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let records = state.store.list(limit).await?;
    Ok(Json(records))
}

/// GET /transcripts/:id
async fn get_transcript(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TranscriptRecord>> {
    let record = state
        .store
        .find_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Transcript {} not found", id)))?;
    Ok(Json(record))
}
