use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{DispatchAck, DispatchError, DispatchJob, TranscriptDispatcher};
use crate::db::TranscriptStore;
use crate::transcript::{append_note, failure_note, TranscriptRecord, TranscriptStatus, TranscriptUpdate};

/// Run the dispatch on its own task so a dropped request cannot leave the
/// record stuck in `processing`. On failure the record is moved to `failed`
/// with a `[dispatch_failed]` note before the handle resolves.
///
/// `record` must be the row as it was written in `processing`.
pub fn spawn_dispatch(
    store: Arc<dyn TranscriptStore>,
    dispatcher: Arc<dyn TranscriptDispatcher>,
    record: TranscriptRecord,
    job: DispatchJob,
) -> JoinHandle<Result<DispatchAck, DispatchError>> {
    tokio::spawn(async move {
        match dispatcher.dispatch(&job).await {
            Ok(ack) => {
                info!(
                    "Dispatched transcript {} to worker (job {})",
                    record.id,
                    ack.job_id.as_deref().unwrap_or("unknown")
                );
                Ok(ack)
            }
            Err(e) => {
                warn!("Dispatch for transcript {} failed: {}", record.id, e);
                mark_failed(store.as_ref(), &record, &e).await;
                Err(e)
            }
        }
    })
}

async fn mark_failed(store: &dyn TranscriptStore, record: &TranscriptRecord, err: &DispatchError) {
    let note = append_note(
        record.notes.as_deref(),
        &failure_note("dispatch_failed", &err.to_string()),
    );
    let update = TranscriptUpdate::transition(TranscriptStatus::Processing, TranscriptStatus::Failed)
        .with_notes(note);

    match store.update(&record.id, update).await {
        Ok(Some(_)) => {}
        // Someone else moved it on; their write stands
        Ok(None) => warn!(
            "Transcript {} left processing before dispatch failure was recorded",
            record.id
        ),
        Err(e) => error!(
            "Failed to record dispatch failure for transcript {}: {:#}",
            record.id, e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteTranscriptStore;
    use crate::transcript::BookingUpsert;
    use async_trait::async_trait;

    struct Rejecting;

    #[async_trait]
    impl TranscriptDispatcher for Rejecting {
        async fn dispatch(&self, _job: &DispatchJob) -> Result<DispatchAck, DispatchError> {
            Err(DispatchError::Rejected {
                status: 503,
                body: "queue full".into(),
            })
        }
    }

    struct Accepting;

    #[async_trait]
    impl TranscriptDispatcher for Accepting {
        async fn dispatch(&self, _job: &DispatchJob) -> Result<DispatchAck, DispatchError> {
            Ok(DispatchAck {
                job_id: Some("job-1".into()),
            })
        }
    }

    async fn processing_record(store: &SqliteTranscriptStore) -> TranscriptRecord {
        let created = store
            .upsert_booking(BookingUpsert {
                external_booking_id: "b1".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .update(
                &created.record.id,
                TranscriptUpdate::transition(TranscriptStatus::Pending, TranscriptStatus::Processing)
                    .with_recording_url("https://cdn.example.com/rec.mp4"),
            )
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_failed_dispatch_marks_record_failed() {
        let store = SqliteTranscriptStore::open_in_memory().unwrap();
        let record = processing_record(&store).await;
        let job = DispatchJob::for_record(&record, "https://cdn.example.com/rec.mp4", "http://cb");

        let result = spawn_dispatch(Arc::new(store.clone()), Arc::new(Rejecting), record.clone(), job)
            .await
            .unwrap();
        assert!(result.is_err());

        let stored = store.find_by_id(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TranscriptStatus::Failed);
        assert!(stored
            .notes
            .unwrap()
            .starts_with("[dispatch_failed] worker rejected job with status 503"));
    }

    #[tokio::test]
    async fn test_successful_dispatch_leaves_processing() {
        let store = SqliteTranscriptStore::open_in_memory().unwrap();
        let record = processing_record(&store).await;
        let job = DispatchJob::for_record(&record, "https://cdn.example.com/rec.mp4", "http://cb");

        let ack = spawn_dispatch(Arc::new(store.clone()), Arc::new(Accepting), record.clone(), job)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ack.job_id.as_deref(), Some("job-1"));

        let stored = store.find_by_id(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TranscriptStatus::Processing);
    }
}
