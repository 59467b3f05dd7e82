//! Record store seam used by every handler.
//!
//! Handlers only see `TranscriptStore`; the SQLite implementation serialises
//! access through one connection on the blocking pool, so each call is atomic
//! with respect to the others.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::init::{migrate, open_db};
use super::transcripts::TranscriptRepository;
use crate::transcript::{BookingUpsert, TranscriptRecord, TranscriptUpdate};

/// Result of an idempotent booking upsert.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub record: TranscriptRecord,
    pub created: bool,
}

#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn upsert_booking(&self, booking: BookingUpsert) -> Result<UpsertOutcome>;

    async fn find_by_id(&self, id: &str) -> Result<Option<TranscriptRecord>>;

    async fn find_by_external_id(&self, external_booking_id: &str)
        -> Result<Option<TranscriptRecord>>;

    /// `Ok(None)` when the id is unknown or the status guard failed.
    async fn update(&self, id: &str, update: TranscriptUpdate)
        -> Result<Option<TranscriptRecord>>;

    async fn list(&self, limit: usize) -> Result<Vec<TranscriptRecord>>;

    /// Claim an event key in the processed-event ledger. `false` means it was
    /// already claimed by an earlier delivery.
    async fn claim_event(&self, event_key: &str, kind: &str) -> Result<bool>;

    async fn release_event(&self, event_key: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteTranscriptStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTranscriptStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_db(path)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        migrate(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Sweep processed-event keys older than `retention_days`. Zero keeps all.
    pub async fn prune_events(&self, retention_days: u32) -> Result<usize> {
        if retention_days == 0 {
            return Ok(0);
        }
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        self.with_conn(move |conn| TranscriptRepository::prune_events(conn, cutoff))
            .await
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| anyhow!("Database connection lock poisoned"))?;
            f(&guard)
        })
        .await
        .context("Database task failed")?
    }
}

#[async_trait]
impl TranscriptStore for SqliteTranscriptStore {
    async fn upsert_booking(&self, booking: BookingUpsert) -> Result<UpsertOutcome> {
        self.with_conn(move |conn| {
            let (record, created) = TranscriptRepository::upsert_booking(conn, &booking)?;
            Ok(UpsertOutcome { record, created })
        })
        .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<TranscriptRecord>> {
        let id = id.to_string();
        self.with_conn(move |conn| TranscriptRepository::get(conn, &id))
            .await
    }

    async fn find_by_external_id(
        &self,
        external_booking_id: &str,
    ) -> Result<Option<TranscriptRecord>> {
        let external_booking_id = external_booking_id.to_string();
        self.with_conn(move |conn| {
            TranscriptRepository::get_by_external_id(conn, &external_booking_id)
        })
        .await
    }

    async fn update(
        &self,
        id: &str,
        update: TranscriptUpdate,
    ) -> Result<Option<TranscriptRecord>> {
        let id = id.to_string();
        self.with_conn(move |conn| TranscriptRepository::update(conn, &id, &update))
            .await
    }

    async fn list(&self, limit: usize) -> Result<Vec<TranscriptRecord>> {
        self.with_conn(move |conn| TranscriptRepository::list(conn, limit))
            .await
    }

    async fn claim_event(&self, event_key: &str, kind: &str) -> Result<bool> {
        let event_key = event_key.to_string();
        let kind = kind.to_string();
        self.with_conn(move |conn| TranscriptRepository::claim_event(conn, &event_key, &kind))
            .await
    }

    async fn release_event(&self, event_key: &str) -> Result<()> {
        let event_key = event_key.to_string();
        self.with_conn(move |conn| TranscriptRepository::release_event(conn, &event_key))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::TranscriptStatus;

    fn booking(uid: &str) -> BookingUpsert {
        BookingUpsert {
            external_booking_id: uid.to_string(),
            title: Some("Intro call".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_store_upsert_and_find() {
        let store = SqliteTranscriptStore::open_in_memory().unwrap();

        let first = store.upsert_booking(booking("b1")).await.unwrap();
        assert!(first.created);
        let again = store.upsert_booking(booking("b1")).await.unwrap();
        assert!(!again.created);
        assert_eq!(first.record.id, again.record.id);

        let by_ext = store.find_by_external_id("b1").await.unwrap().unwrap();
        assert_eq!(by_ext.id, first.record.id);
        let by_id = store.find_by_id(&first.record.id).await.unwrap().unwrap();
        assert_eq!(by_id.external_booking_id, "b1");
        assert_eq!(store.list(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_store_guarded_update() {
        let store = SqliteTranscriptStore::open_in_memory().unwrap();
        let record = store.upsert_booking(booking("b2")).await.unwrap().record;

        let moved = store
            .update(
                &record.id,
                TranscriptUpdate::transition(TranscriptStatus::Pending, TranscriptStatus::Processing),
            )
            .await
            .unwrap();
        assert_eq!(moved.unwrap().status, TranscriptStatus::Processing);

        // Same guard again no longer matches
        let stale = store
            .update(
                &record.id,
                TranscriptUpdate::transition(TranscriptStatus::Pending, TranscriptStatus::Cancelled),
            )
            .await
            .unwrap();
        assert!(stale.is_none());
    }

    #[tokio::test]
    async fn test_store_clones_share_connection() {
        let store = SqliteTranscriptStore::open_in_memory().unwrap();
        let other = store.clone();

        store.upsert_booking(booking("shared")).await.unwrap();
        assert!(other.find_by_external_id("shared").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_store_event_ledger() {
        let store = SqliteTranscriptStore::open_in_memory().unwrap();
        assert!(store.claim_event("callback:job-1", "callback").await.unwrap());
        assert!(!store.claim_event("callback:job-1", "callback").await.unwrap());
        store.release_event("callback:job-1").await.unwrap();
        assert!(store.claim_event("callback:job-1", "callback").await.unwrap());
    }

    #[tokio::test]
    async fn test_store_prune_keeps_recent_keys() {
        let store = SqliteTranscriptStore::open_in_memory().unwrap();
        store.claim_event("callback:job-1", "callback").await.unwrap();

        assert_eq!(store.prune_events(30).await.unwrap(), 0);
        assert_eq!(store.prune_events(0).await.unwrap(), 0);
        assert!(!store.claim_event("callback:job-1", "callback").await.unwrap());
    }

    #[tokio::test]
    async fn test_store_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("scribehook.db");

        {
            let store = SqliteTranscriptStore::open(&path).unwrap();
            store.upsert_booking(booking("persisted")).await.unwrap();
        }

        let reopened = SqliteTranscriptStore::open(&path).unwrap();
        assert!(reopened
            .find_by_external_id("persisted")
            .await
            .unwrap()
            .is_some());
    }
}
