use crate::api::{ApiServer, AppState};
use crate::config::Config;
use crate::db::SqliteTranscriptStore;
use crate::dispatch::HttpDispatchClient;
use crate::retry::CalPlatformClient;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::info;

pub async fn run_service(config: Config) -> Result<()> {
    info!("Starting scribehook service");

    let db_path = config.database_path()?;
    let store = Arc::new(SqliteTranscriptStore::open(&db_path)?);
    info!("Using transcript database at {:?}", db_path);

    let pruned = store
        .prune_events(config.database.event_retention_days)
        .await?;
    if pruned > 0 {
        info!(
            "Pruned {} processed-event keys older than {} days",
            pruned, config.database.event_retention_days
        );
    }

    let dispatcher = HttpDispatchClient::from_config(&config.worker)
        .map_err(|e| anyhow!("Failed to create dispatch client: {}", e))?;
    let platform = CalPlatformClient::new(&config.platform);

    let state = AppState::new(&config, store, Arc::new(dispatcher), Arc::new(platform))?;

    info!("Worker endpoint: {}", config.worker.endpoint);
    info!("Worker callback URL: {}", config.server.callback_url());

    ApiServer::new(&config, state).start().await
}
