use anyhow::{anyhow, Result};
use std::sync::Arc;

use super::args::RetryCliArgs;
use crate::config::Config;
use crate::db::SqliteTranscriptStore;
use crate::retry::{CalPlatformClient, RetryOrchestrator};

/// Run a retry in-process against the configured database.
pub async fn handle_retry_command(args: RetryCliArgs, config: &Config) -> Result<()> {
    if config.platform.api_key.is_empty() {
        return Err(anyhow!(
            "platform.api_key is not set; configure it or export SCRIBEHOOK_PLATFORM_API_KEY"
        ));
    }

    let store = SqliteTranscriptStore::open(&config.database_path()?)?;
    let platform = CalPlatformClient::new(&config.platform);
    let orchestrator = RetryOrchestrator::new(Arc::new(store), Arc::new(platform))?;

    let outcome = orchestrator
        .retry(&args.id)
        .await
        .map_err(|e| anyhow!("Retry of {} failed: {}", args.id, e))?;

    println!("Transcript {}: {}", outcome.transcript_id, outcome.status);
    if let Some(reason) = &outcome.reason {
        println!(
            "Reason: [{}] {}",
            reason,
            outcome.error.as_deref().unwrap_or("")
        );
    }

    Ok(())
}
