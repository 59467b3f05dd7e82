//! Inbound webhooks from the scheduling platform and the transcription worker.
//!
//! Both handlers take the raw body so signatures are checked against the
//! exact bytes that were sent.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Json,
    routing::post,
    Router,
};
use tracing::info;

use crate::ack::Ack;
use crate::api::error::ApiResult;
use crate::api::AppState;
use crate::webhook::{WebhookEvent, PLATFORM_SIGNATURE_HEADER, WORKER_SIGNATURE_HEADER};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/cal", post(platform_webhook))
        .route("/webhooks/transcription", post(transcription_callback))
        .with_state(state)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// POST /webhooks/cal - Platform booking and recording events.
async fn platform_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Ack>> {
    state
        .verifier
        .verify(&body, header_str(&headers, PLATFORM_SIGNATURE_HEADER))?;

    let event = WebhookEvent::parse(&body)?;
    info!("Received {} webhook", event.trigger_event());

    let ack = state.events.handle(event).await?;
    Ok(Json(ack))
}

/// POST /webhooks/transcription - Worker result callback.
async fn transcription_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Ack>> {
    let ack = state
        .callbacks
        .handle(&body, header_str(&headers, WORKER_SIGNATURE_HEADER))
        .await?;
    Ok(Json(ack))
}
