//! HTTP surface of the service.
//!
//! Provides endpoints for:
//! - Platform webhooks (POST /webhooks/cal)
//! - Worker callbacks (POST /webhooks/transcription)
//! - Operator retry and record views (/transcripts)
//! - Service info and health

pub mod error;
pub mod routes;

use crate::callback::CallbackReceiver;
use crate::config::Config;
use crate::db::TranscriptStore;
use crate::dispatch::TranscriptDispatcher;
use crate::retry::{PlatformApi, RetryOrchestrator};
use crate::webhook::{EventRouter, SignatureVerifier};
use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::{error, info};

/// Webhook bodies are small JSON documents.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Shared handler state. Every component is built once from `Config`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TranscriptStore>,
    pub verifier: SignatureVerifier,
    pub events: Arc<EventRouter>,
    pub callbacks: Arc<CallbackReceiver>,
    pub retry: Arc<RetryOrchestrator>,
}

impl AppState {
    pub fn new(
        config: &Config,
        store: Arc<dyn TranscriptStore>,
        dispatcher: Arc<dyn TranscriptDispatcher>,
        platform: Arc<dyn PlatformApi>,
    ) -> Result<Self> {
        let events = EventRouter::new(
            store.clone(),
            dispatcher,
            config.server.callback_url(),
        )
        .complete_on_meeting_ended(config.webhook.complete_on_meeting_ended);

        let mut callbacks = CallbackReceiver::new(store.clone());
        if let Some(secret) = config.worker.callback_secret.as_deref() {
            let verifier = SignatureVerifier::new(secret);
            if verifier.is_configured() {
                callbacks = callbacks.with_verifier(verifier);
            }
        }

        let retry = RetryOrchestrator::new(store.clone(), platform)
            .context("Failed to build retry orchestrator")?;

        Ok(Self {
            store,
            verifier: SignatureVerifier::new(&config.webhook.secret),
            events: Arc::new(events),
            callbacks: Arc::new(callbacks),
            retry: Arc::new(retry),
        })
    }
}

/// Full application router, also used directly by integration tests.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/version", get(version))
        .route("/health", get(health).with_state(state.clone()))
        .merge(routes::webhooks::router(state.clone()))
        .merge(routes::transcripts::router(state))
        .layer(ServiceBuilder::new().layer(DefaultBodyLimit::max(MAX_BODY_BYTES)))
}

pub struct ApiServer {
    host: String,
    port: u16,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: &Config, state: AppState) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            state,
        }
    }

    pub async fn start(self) -> Result<()> {
        let app = build_router(self.state);

        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!("API server listening on http://{}", addr);
        info!("Endpoints:");
        info!("  GET  /                        - Service info");
        info!("  GET  /version                 - Version info");
        info!("  GET  /health                  - Store health");
        info!("  POST /webhooks/cal            - Platform webhooks");
        info!("  POST /webhooks/transcription  - Worker callbacks");
        info!("  POST /transcripts/retry       - Retry a transcript");
        info!("  GET  /transcripts             - List transcripts");
        info!("  GET  /transcripts/:id         - Get a transcript");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "scribehook",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "scribehook"
    }))
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.store.list(1).await {
        Ok(_) => (StatusCode::OK, Json(json!({"status": "ok"}))),
        Err(e) => {
            error!("Health check failed: {:#}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unavailable", "message": e.to_string()})),
            )
        }
    }
}
