//! Receives transcription results posted back by the worker.
//!
//! Payload: `{bookingUid, transcription, jobId, status, error}`. A callback is
//! matched to its record by booking uid. When the worker sends a job id the
//! delivery is recorded in the processed-event ledger so replays are
//! acknowledged without touching the record again. Without a job id, a
//! callback that would leave the record exactly as it is counts as a replay.

use anyhow::anyhow;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::ack::{Ack, Action};
use crate::db::TranscriptStore;
use crate::error::{PipelineError, PipelineResult};
use crate::transcript::{
    append_note, failure_note, Actor, TranscriptRecord, TranscriptStatus, TranscriptUpdate,
};
use crate::webhook::SignatureVerifier;

const DEFAULT_FAILURE: &str = "transcription failed";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    pub booking_uid: Option<String>,
    /// Either the transcript text or an object carrying `text` and extras.
    #[serde(default)]
    pub transcription: Value,
    #[serde(default)]
    pub job_id: Value,
    pub status: Option<String>,
    pub error: Option<String>,
}

impl CallbackPayload {
    pub fn booking_uid(&self) -> Option<&str> {
        self.booking_uid
            .as_deref()
            .map(str::trim)
            .filter(|uid| !uid.is_empty())
    }

    /// Workers send ids as strings or numbers.
    pub fn job_id(&self) -> Option<String> {
        match &self.job_id {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("completed"))
    }

    pub fn text(&self) -> String {
        match &self.transcription {
            Value::String(text) => text.trim().to_string(),
            Value::Object(obj) => obj
                .get("text")
                .and_then(Value::as_str)
                .map(|t| t.trim().to_string())
                .unwrap_or_default(),
            _ => String::new(),
        }
    }

    fn failure_message(&self) -> String {
        match (self.error.as_deref().map(str::trim), self.status.as_deref()) {
            (Some(error), _) if !error.is_empty() => error.to_string(),
            (_, Some(status)) if !status.trim().is_empty() => {
                format!("worker reported status {}", status.trim())
            }
            _ => DEFAULT_FAILURE.to_string(),
        }
    }
}

/// `Duration: {d}s | Language: {l} | Segments: {n} | Words: {m}`, with only
/// the parts the worker supplied.
pub fn summary_line(transcription: &Value, text: &str) -> Option<String> {
    let mut parts = Vec::new();

    if let Some(duration) = transcription.get("duration").and_then(Value::as_f64) {
        let rounded = (duration * 100.0).round() / 100.0;
        parts.push(format!("Duration: {}s", rounded));
    }
    if let Some(language) = transcription
        .get("language")
        .and_then(Value::as_str)
        .filter(|l| !l.is_empty())
    {
        parts.push(format!("Language: {}", language));
    }
    if let Some(segments) = transcription
        .get("segments")
        .or_else(|| transcription.get("utterances"))
        .and_then(Value::as_array)
    {
        parts.push(format!("Segments: {}", segments.len()));
    }

    let words = match transcription.get("words").and_then(Value::as_array) {
        Some(words) => words.len(),
        None => text.split_whitespace().count(),
    };
    if words > 0 {
        parts.push(format!("Words: {}", words));
    }

    (!parts.is_empty()).then(|| parts.join(" | "))
}

pub struct CallbackReceiver {
    store: Arc<dyn TranscriptStore>,
    verifier: Option<SignatureVerifier>,
}

impl CallbackReceiver {
    pub fn new(store: Arc<dyn TranscriptStore>) -> Self {
        Self {
            store,
            verifier: None,
        }
    }

    /// Require `x-worker-signature-256` on every callback.
    pub fn with_verifier(mut self, verifier: SignatureVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub async fn handle(&self, raw_body: &[u8], signature: Option<&str>) -> PipelineResult<Ack> {
        if let Some(verifier) = &self.verifier {
            verifier.verify(raw_body, signature)?;
        }

        let payload: CallbackPayload = serde_json::from_slice(raw_body)
            .map_err(|e| PipelineError::validation(format!("malformed callback body: {}", e)))?;

        self.apply(payload).await
    }

    pub async fn apply(&self, payload: CallbackPayload) -> PipelineResult<Ack> {
        let uid = payload
            .booking_uid()
            .ok_or_else(|| PipelineError::validation("callback has no bookingUid"))?;

        let record = self
            .store
            .find_by_external_id(uid)
            .await?
            .ok_or_else(|| PipelineError::not_found(format!("no transcript for booking {}", uid)))?;

        if record.status == TranscriptStatus::Cancelled {
            warn!("Ignoring callback for cancelled transcript {}", record.id);
            return Ok(Ack::for_record(Action::Ignored, &record).with_detail("transcript cancelled"));
        }

        let event_key = payload.job_id().map(|job| format!("callback:{}", job));
        if let Some(key) = &event_key {
            if !self.store.claim_event(key, "callback").await? {
                info!("Duplicate callback {} for transcript {}", key, record.id);
                return Ok(Ack::for_record(Action::Duplicate, &record));
            }
        }

        let result = if payload.is_completed() {
            self.complete(&record, &payload).await
        } else {
            self.fail(&record, "worker_failed", &payload.failure_message())
                .await
        };

        // A failed application must not swallow the redelivery
        if result.is_err() {
            if let Some(key) = &event_key {
                if let Err(e) = self.store.release_event(key).await {
                    error!("Failed to release callback key {}: {:#}", key, e);
                }
            }
        }

        result
    }

    async fn complete(
        &self,
        record: &TranscriptRecord,
        payload: &CallbackPayload,
    ) -> PipelineResult<Ack> {
        let text = payload.text();
        if text.is_empty() {
            return self
                .fail(
                    record,
                    "empty_transcript",
                    "worker reported completion without transcript text",
                )
                .await;
        }

        if record.status == TranscriptStatus::Completed
            && record.transcript_text.as_deref() == Some(text.as_str())
        {
            info!("Transcript {} already holds this transcript", record.id);
            return Ok(Ack::for_record(Action::Duplicate, record));
        }

        record.lifecycle().check_completion(Actor::Worker, &text)?;

        let structured = payload
            .transcription
            .is_object()
            .then(|| payload.transcription.clone());
        let mut update = TranscriptUpdate::transition(record.status, TranscriptStatus::Completed)
            .with_transcript(text.as_str(), structured);
        if let Some(summary) = summary_line(&payload.transcription, &text) {
            update = update.with_notes(append_note(record.notes.as_deref(), &summary));
        }

        let updated = self.store.update(&record.id, update).await?.ok_or_else(|| {
            PipelineError::Internal(anyhow!(
                "transcript {} changed while applying callback",
                record.id
            ))
        })?;

        info!(
            "Transcript {} completed ({} chars)",
            updated.id,
            text.chars().count()
        );
        Ok(Ack::for_record(Action::Updated, &updated))
    }

    async fn fail(
        &self,
        record: &TranscriptRecord,
        code: &str,
        message: &str,
    ) -> PipelineResult<Ack> {
        if let Err(e) = record
            .lifecycle()
            .check(TranscriptStatus::Failed, Actor::Worker)
        {
            warn!(
                "Ignoring worker failure for transcript {}: {}",
                record.id, e
            );
            return Ok(Ack::for_record(Action::Ignored, record).with_detail(e.to_string()));
        }

        let line = failure_note(code, message);
        if record.status == TranscriptStatus::Failed
            && record
                .notes
                .as_deref()
                .is_some_and(|notes| notes.trim_end().ends_with(&line))
        {
            info!("Transcript {} already records [{}]", record.id, code);
            return Ok(Ack::for_record(Action::Duplicate, record));
        }

        let note = append_note(record.notes.as_deref(), &line);
        let update =
            TranscriptUpdate::transition(record.status, TranscriptStatus::Failed).with_notes(note);

        let updated = self.store.update(&record.id, update).await?.ok_or_else(|| {
            PipelineError::Internal(anyhow!(
                "transcript {} changed while applying callback",
                record.id
            ))
        })?;

        warn!("Transcript {} failed: [{}] {}", updated.id, code, message);
        Ok(Ack::for_record(Action::Updated, &updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteTranscriptStore;
    use crate::transcript::BookingUpsert;
    use serde_json::json;

    async fn setup(status: TranscriptStatus) -> (SqliteTranscriptStore, CallbackReceiver) {
        let store = SqliteTranscriptStore::open_in_memory().unwrap();
        let created = store
            .upsert_booking(BookingUpsert {
                external_booking_id: "b1".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        if status != TranscriptStatus::Pending {
            store
                .update(
                    &created.record.id,
                    TranscriptUpdate::transition(TranscriptStatus::Pending, status),
                )
                .await
                .unwrap()
                .unwrap();
        }
        let receiver = CallbackReceiver::new(Arc::new(store.clone()));
        (store, receiver)
    }

    fn payload(value: Value) -> CallbackPayload {
        serde_json::from_value(value).unwrap()
    }

    async fn stored(store: &SqliteTranscriptStore) -> TranscriptRecord {
        store.find_by_external_id("b1").await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_completed_callback_stores_transcript_and_summary() {
        let (store, receiver) = setup(TranscriptStatus::Processing).await;
        let ack = receiver
            .apply(payload(json!({
                "bookingUid": "b1",
                "jobId": "job-1",
                "status": "completed",
                "transcription": {
                    "text": "hello there world",
                    "duration": 5.0,
                    "language": "en",
                    "segments": [{"text": "hello there"}, {"text": "world"}]
                }
            })))
            .await
            .unwrap();
        assert_eq!(ack.status, Some(TranscriptStatus::Completed));

        let record = stored(&store).await;
        assert_eq!(record.transcript_text.as_deref(), Some("hello there world"));
        assert_eq!(
            record.transcript_structured.unwrap()["language"],
            json!("en")
        );
        assert_eq!(
            record.notes.as_deref(),
            Some("Duration: 5s | Language: en | Segments: 2 | Words: 3")
        );
    }

    #[tokio::test]
    async fn test_plain_string_transcription() {
        let (store, receiver) = setup(TranscriptStatus::Processing).await;
        receiver
            .apply(payload(json!({
                "bookingUid": "b1",
                "status": "completed",
                "transcription": "  just text  "
            })))
            .await
            .unwrap();

        let record = stored(&store).await;
        assert_eq!(record.status, TranscriptStatus::Completed);
        assert_eq!(record.transcript_text.as_deref(), Some("just text"));
        assert!(record.transcript_structured.is_none());
    }

    #[tokio::test]
    async fn test_empty_completion_becomes_failure() {
        let (store, receiver) = setup(TranscriptStatus::Processing).await;
        receiver
            .apply(payload(json!({
                "bookingUid": "b1",
                "status": "completed",
                "transcription": {"text": "   "}
            })))
            .await
            .unwrap();

        let record = stored(&store).await;
        assert_eq!(record.status, TranscriptStatus::Failed);
        assert!(record.transcript_text.is_none());
        assert!(record.notes.unwrap().starts_with("[empty_transcript]"));
    }

    #[tokio::test]
    async fn test_worker_failure_is_recorded() {
        let (store, receiver) = setup(TranscriptStatus::Processing).await;
        receiver
            .apply(payload(json!({
                "bookingUid": "b1",
                "status": "failed",
                "error": "audio track missing"
            })))
            .await
            .unwrap();

        let record = stored(&store).await;
        assert_eq!(record.status, TranscriptStatus::Failed);
        assert_eq!(
            record.notes.as_deref(),
            Some("[worker_failed] audio track missing")
        );
    }

    #[tokio::test]
    async fn test_callback_for_cancelled_is_ignored() {
        let (store, receiver) = setup(TranscriptStatus::Cancelled).await;
        let ack = receiver
            .apply(payload(json!({
                "bookingUid": "b1",
                "status": "completed",
                "transcription": {"text": "late"}
            })))
            .await
            .unwrap();

        assert_eq!(ack.action, Action::Ignored);
        let record = stored(&store).await;
        assert_eq!(record.status, TranscriptStatus::Cancelled);
        assert!(record.transcript_text.is_none());
    }

    #[tokio::test]
    async fn test_failure_after_completion_is_ignored() {
        let (store, receiver) = setup(TranscriptStatus::Processing).await;
        receiver
            .apply(payload(json!({
                "bookingUid": "b1",
                "status": "completed",
                "transcription": {"text": "done"}
            })))
            .await
            .unwrap();

        let ack = receiver
            .apply(payload(json!({"bookingUid": "b1", "status": "failed"})))
            .await
            .unwrap();
        assert_eq!(ack.action, Action::Ignored);
        assert_eq!(stored(&store).await.status, TranscriptStatus::Completed);
    }

    #[tokio::test]
    async fn test_duplicate_job_id_is_acknowledged_once() {
        let (store, receiver) = setup(TranscriptStatus::Processing).await;
        let body = json!({
            "bookingUid": "b1",
            "jobId": 77,
            "status": "completed",
            "transcription": {"text": "first", "duration": 1.5}
        });
        receiver.apply(payload(body.clone())).await.unwrap();
        let ack = receiver.apply(payload(body)).await.unwrap();

        assert_eq!(ack.action, Action::Duplicate);
        assert_eq!(
            stored(&store).await.notes.as_deref(),
            Some("Duration: 1.5s | Words: 1")
        );
    }

    #[tokio::test]
    async fn test_redelivery_without_job_id_changes_nothing() {
        let (store, receiver) = setup(TranscriptStatus::Processing).await;
        let body = json!({
            "bookingUid": "b1",
            "status": "completed",
            "transcription": {"text": "hello", "duration": 5.0}
        });
        receiver.apply(payload(body.clone())).await.unwrap();
        let before = stored(&store).await;

        let ack = receiver.apply(payload(body)).await.unwrap();
        assert_eq!(ack.action, Action::Duplicate);

        let after = stored(&store).await;
        assert_eq!(after.notes.as_deref(), Some("Duration: 5s | Words: 1"));
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[tokio::test]
    async fn test_corrected_transcript_replaces_previous() {
        let (store, receiver) = setup(TranscriptStatus::Processing).await;
        for text in ["first draft", "final text"] {
            receiver
                .apply(payload(json!({
                    "bookingUid": "b1",
                    "status": "completed",
                    "transcription": text
                })))
                .await
                .unwrap();
        }

        let record = stored(&store).await;
        assert_eq!(record.transcript_text.as_deref(), Some("final text"));
        assert_eq!(record.notes.as_deref(), Some("Words: 2\nWords: 2"));
    }

    #[tokio::test]
    async fn test_repeated_worker_failure_is_noted_once() {
        let (store, receiver) = setup(TranscriptStatus::Processing).await;
        let body = json!({"bookingUid": "b1", "status": "failed", "error": "audio track missing"});
        receiver.apply(payload(body.clone())).await.unwrap();
        let ack = receiver.apply(payload(body)).await.unwrap();

        assert_eq!(ack.action, Action::Duplicate);
        assert_eq!(
            stored(&store).await.notes.as_deref(),
            Some("[worker_failed] audio track missing")
        );
    }

    #[tokio::test]
    async fn test_unknown_booking_and_missing_uid() {
        let (_store, receiver) = setup(TranscriptStatus::Processing).await;
        assert!(matches!(
            receiver
                .apply(payload(json!({"bookingUid": "ghost", "status": "completed"})))
                .await,
            Err(PipelineError::NotFound(_))
        ));
        assert!(matches!(
            receiver.apply(payload(json!({"status": "completed"}))).await,
            Err(PipelineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_signature_enforced_when_configured() {
        let (_store, receiver) = setup(TranscriptStatus::Processing).await;
        let receiver = receiver.with_verifier(SignatureVerifier::new("cb-secret"));
        let body = br#"{"bookingUid":"b1","status":"completed","transcription":"hi"}"#;

        assert!(matches!(
            receiver.handle(body, None).await,
            Err(PipelineError::Authentication(_))
        ));

        let sig = SignatureVerifier::new("cb-secret").sign(body).unwrap();
        let ack = receiver.handle(body, Some(&sig)).await.unwrap();
        assert_eq!(ack.status, Some(TranscriptStatus::Completed));
    }

    #[test]
    fn test_summary_line_variants() {
        assert_eq!(
            summary_line(&json!({"duration": 12.3456}), "a b").as_deref(),
            Some("Duration: 12.35s | Words: 2")
        );
        assert_eq!(
            summary_line(&json!({"words": [{}, {}, {}], "utterances": []}), "").as_deref(),
            Some("Segments: 0 | Words: 3")
        );
        assert_eq!(summary_line(&json!({}), ""), None);
    }

    #[test]
    fn test_failure_message_defaults() {
        assert_eq!(
            payload(json!({"status": "error"})).failure_message(),
            "worker reported status error"
        );
        assert_eq!(payload(json!({})).failure_message(), DEFAULT_FAILURE);
    }
}
