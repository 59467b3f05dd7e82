use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variables that override secrets and deployment-specific values.
pub mod env_keys {
    pub const WEBHOOK_SECRET: &str = "SCRIBEHOOK_WEBHOOK_SECRET";
    pub const CALLBACK_SECRET: &str = "SCRIBEHOOK_CALLBACK_SECRET";
    pub const WORKER_ENDPOINT: &str = "SCRIBEHOOK_WORKER_ENDPOINT";
    pub const WORKER_API_KEY: &str = "SCRIBEHOOK_WORKER_API_KEY";
    pub const PLATFORM_API_KEY: &str = "SCRIBEHOOK_PLATFORM_API_KEY";
    pub const PUBLIC_URL: &str = "SCRIBEHOOK_PUBLIC_URL";
    pub const DATABASE_PATH: &str = "SCRIBEHOOK_DATABASE_PATH";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub webhook: WebhookConfig,
    pub worker: WorkerConfig,
    pub platform: PlatformConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Externally reachable base URL, used to build the worker callback URL.
    pub public_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Shared secret for `x-cal-signature-256`. Empty means every delivery is rejected.
    pub secret: String,
    /// Advance `pending` records to `completed` when MEETING_ENDED arrives.
    pub complete_on_meeting_ended: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Job submission endpoint of the transcription worker.
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    /// When set, callbacks must carry `x-worker-signature-256`.
    pub callback_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub api_base: String,
    pub api_key: String,
    pub metadata_timeout_seconds: u64,
    pub listing_timeout_seconds: u64,
    pub download_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Defaults to `<data_dir>/scribehook/scribehook.db` when unset.
    pub path: Option<PathBuf>,
    /// Processed-event keys older than this are swept at startup. 0 keeps them forever.
    pub event_retention_days: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            event_retention_days: 30,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3838,
            public_url: "http://127.0.0.1:3838".to_string(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            complete_on_meeting_ended: true,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:3141/api/v1/jobs".to_string(),
            api_key: None,
            timeout_seconds: 60,
            callback_secret: None,
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.cal.com/v1".to_string(),
            api_key: String::new(),
            metadata_timeout_seconds: 10,
            listing_timeout_seconds: 30,
            download_timeout_seconds: 300,
        }
    }
}

impl ServerConfig {
    pub fn callback_url(&self) -> String {
        format!(
            "{}/webhooks/transcription",
            self.public_url.trim_end_matches('/')
        )
    }
}

impl WorkerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

impl PlatformConfig {
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_seconds.max(1))
    }

    pub fn listing_timeout(&self) -> Duration {
        Duration::from_secs(self.listing_timeout_seconds.max(1))
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_seconds.max(1))
    }
}

impl Config {
    /// Load from `path` (or the default config file), creating defaults when
    /// missing, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let mut config = if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save_to(&config_path)?;
            config
        } else {
            let content =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
            info!("Loaded config from {:?}", config_path);
            config
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.warn_on_gaps();
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Overlay values from the environment. Empty variables are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(secret) = get(env_keys::WEBHOOK_SECRET) {
            self.webhook.secret = secret;
        }
        if let Some(secret) = get(env_keys::CALLBACK_SECRET) {
            self.worker.callback_secret = Some(secret);
        }
        if let Some(endpoint) = get(env_keys::WORKER_ENDPOINT) {
            self.worker.endpoint = endpoint;
        }
        if let Some(key) = get(env_keys::WORKER_API_KEY) {
            self.worker.api_key = Some(key);
        }
        if let Some(key) = get(env_keys::PLATFORM_API_KEY) {
            self.platform.api_key = key;
        }
        if let Some(url) = get(env_keys::PUBLIC_URL) {
            self.server.public_url = url;
        }
        if let Some(path) = get(env_keys::DATABASE_PATH) {
            self.database.path = Some(PathBuf::from(path));
        }
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database.path {
            Some(path) => Ok(path.clone()),
            None => global::db_file(),
        }
    }

    fn warn_on_gaps(&self) {
        if self.webhook.secret.is_empty() {
            warn!("webhook.secret is empty: every platform webhook will be rejected with 401");
        }
        if self.worker.callback_secret.as_deref().map_or(true, str::is_empty) {
            warn!("worker.callback_secret is unset: transcription callbacks are accepted unauthenticated");
        }
        if self.platform.api_key.is_empty() {
            warn!("platform.api_key is empty: transcript retries will fail against the platform API");
        }
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
