//! Applies verified platform events to transcript records.

use anyhow::anyhow;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use super::events::{
    duration_minutes, triggers, BookingPayload, BookingRef, RecordingReadyPayload, WebhookEvent,
};
use super::meeting_link::resolve_meeting_link;
use crate::ack::{Ack, Action};
use crate::db::TranscriptStore;
use crate::dispatch::{spawn_dispatch, DispatchJob, TranscriptDispatcher};
use crate::error::{PipelineError, PipelineResult};
use crate::transcript::{Actor, BookingUpsert, TranscriptStatus, TranscriptUpdate};

pub struct EventRouter {
    store: Arc<dyn TranscriptStore>,
    dispatcher: Arc<dyn TranscriptDispatcher>,
    callback_url: String,
    complete_on_meeting_ended: bool,
}

impl EventRouter {
    pub fn new(
        store: Arc<dyn TranscriptStore>,
        dispatcher: Arc<dyn TranscriptDispatcher>,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            callback_url: callback_url.into(),
            complete_on_meeting_ended: true,
        }
    }

    pub fn complete_on_meeting_ended(mut self, enabled: bool) -> Self {
        self.complete_on_meeting_ended = enabled;
        self
    }

    pub async fn handle(&self, event: WebhookEvent) -> PipelineResult<Ack> {
        match event {
            WebhookEvent::BookingCreated(booking) => self.booking_created(booking).await,
            WebhookEvent::BookingCancelled(booking) => self.booking_cancelled(booking).await,
            WebhookEvent::MeetingEnded(booking) => self.meeting_ended(booking).await,
            WebhookEvent::RecordingReady(recording) => self.recording_ready(recording).await,
            WebhookEvent::Ignored { trigger_event } => {
                info!("Ignoring {} webhook", trigger_event);
                Ok(Ack::bare(
                    Action::Ignored,
                    format!("unhandled trigger {}", trigger_event),
                ))
            }
        }
    }

    async fn booking_created(&self, booking: BookingPayload) -> PipelineResult<Ack> {
        let uid = booking
            .uid
            .as_deref()
            .map(str::trim)
            .filter(|uid| !uid.is_empty())
            .ok_or_else(|| PipelineError::validation("BOOKING_CREATED payload has no uid"))?;

        let client = booking.client();
        let organizer = booking.organizer.as_ref();
        let (start, end) = (booking.start(), booking.end());

        let upsert = BookingUpsert {
            external_booking_id: uid.to_string(),
            title: booking.title.clone(),
            start_time: start,
            end_time: end,
            duration_minutes: duration_minutes(start, end),
            client_name: client.and_then(|c| c.name.clone()),
            client_email: client.and_then(|c| c.email.clone()),
            host_name: organizer.and_then(|o| o.name.clone()),
            host_email: organizer.and_then(|o| o.email.clone()),
            meeting_link: resolve_meeting_link(&booking),
        };

        let outcome = self.store.upsert_booking(upsert).await?;
        if outcome.created {
            info!(
                "Created transcript {} for booking {}",
                outcome.record.id, uid
            );
            Ok(Ack::for_record(Action::Created, &outcome.record))
        } else {
            info!(
                "Refreshed metadata of transcript {} for booking {}",
                outcome.record.id, uid
            );
            Ok(Ack::for_record(Action::Updated, &outcome.record))
        }
    }

    async fn booking_cancelled(&self, booking: BookingRef) -> PipelineResult<Ack> {
        let uid = require_uid(&booking, triggers::BOOKING_CANCELLED)?;

        let Some(record) = self.store.find_by_external_id(uid).await? else {
            warn!("BOOKING_CANCELLED for unknown booking {}", uid);
            return Ok(Ack::bare(Action::NoOp, "unknown booking"));
        };

        if let Err(e) = record
            .lifecycle()
            .check(TranscriptStatus::Cancelled, Actor::Webhook)
        {
            warn!("Not cancelling transcript {}: {}", record.id, e);
            return Ok(Ack::for_record(Action::NoOp, &record).with_detail(e.to_string()));
        }

        let update = TranscriptUpdate::transition(record.status, TranscriptStatus::Cancelled);
        match self.store.update(&record.id, update).await? {
            Some(updated) => {
                info!("Cancelled transcript {} ({})", updated.id, uid);
                Ok(Ack::for_record(Action::Updated, &updated))
            }
            None => {
                warn!(
                    "Transcript {} changed while cancelling; leaving it as is",
                    record.id
                );
                Ok(Ack::for_record(Action::NoOp, &record).with_detail("status changed concurrently"))
            }
        }
    }

    async fn meeting_ended(&self, booking: BookingRef) -> PipelineResult<Ack> {
        let uid = require_uid(&booking, triggers::MEETING_ENDED)?;

        let Some(record) = self.store.find_by_external_id(uid).await? else {
            warn!("MEETING_ENDED for unknown booking {}", uid);
            return Ok(Ack::bare(Action::NoOp, "unknown booking"));
        };

        let now = Utc::now();
        let end_only = TranscriptUpdate {
            end_time: Some(now),
            ..Default::default()
        };

        let completes = self.complete_on_meeting_ended
            && record.status == TranscriptStatus::Pending
            && record
                .lifecycle()
                .check(TranscriptStatus::Completed, Actor::Webhook)
                .is_ok();

        if completes {
            let update = TranscriptUpdate {
                end_time: Some(now),
                ..TranscriptUpdate::transition(TranscriptStatus::Pending, TranscriptStatus::Completed)
            };
            if let Some(updated) = self.store.update(&record.id, update).await? {
                info!(
                    "Meeting ended; transcript {} marked completed pending a recording",
                    updated.id
                );
                return Ok(Ack::for_record(Action::Updated, &updated));
            }
            // Lost the race to another transition; still record the end time
            warn!(
                "Transcript {} left pending before MEETING_ENDED applied",
                record.id
            );
        }

        let updated = self
            .store
            .update(&record.id, end_only)
            .await?
            .ok_or_else(|| PipelineError::not_found(format!("transcript {} vanished", record.id)))?;
        info!("Meeting ended for transcript {}", updated.id);
        Ok(Ack::for_record(Action::Updated, &updated))
    }

    async fn recording_ready(&self, recording: RecordingReadyPayload) -> PipelineResult<Ack> {
        let uid = recording
            .booking_uid()
            .ok_or_else(|| PipelineError::validation("RECORDING_READY payload has no booking uid"))?;
        let download_url = recording
            .download_url()
            .ok_or_else(|| PipelineError::validation("RECORDING_READY payload has no download URL"))?;

        let record = self
            .store
            .find_by_external_id(uid)
            .await?
            .ok_or_else(|| PipelineError::not_found(format!("no transcript for booking {}", uid)))?;

        if let Err(e) = record
            .lifecycle()
            .check(TranscriptStatus::Processing, Actor::Webhook)
        {
            info!("Ignoring recording for transcript {}: {}", record.id, e);
            return Ok(Ack::for_record(Action::Ignored, &record).with_detail(e.to_string()));
        }

        let event_key = format!("recording_ready:{}:{}", uid, download_url);
        if !self
            .store
            .claim_event(&event_key, triggers::RECORDING_READY)
            .await?
        {
            info!("Duplicate RECORDING_READY for booking {}", uid);
            return Ok(Ack::for_record(Action::Duplicate, &record));
        }

        let update = TranscriptUpdate::transition(record.status, TranscriptStatus::Processing)
            .with_recording_url(download_url);
        let processing = match self.store.update(&record.id, update).await {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                // Let a redelivery re-evaluate against the new status
                self.store.release_event(&event_key).await?;
                warn!(
                    "Transcript {} changed before recording could be applied",
                    record.id
                );
                return Ok(Ack::for_record(Action::Ignored, &record)
                    .with_detail("status changed concurrently"));
            }
            Err(e) => {
                self.store.release_event(&event_key).await?;
                return Err(e.into());
            }
        };
        info!(
            "Transcript {} is processing recording for booking {}",
            processing.id, uid
        );

        let job = DispatchJob::for_record(&processing, download_url, &self.callback_url);
        let handle = spawn_dispatch(
            self.store.clone(),
            self.dispatcher.clone(),
            processing.clone(),
            job,
        );

        match handle.await {
            Ok(Ok(_)) => Ok(Ack::for_record(Action::Dispatched, &processing)),
            Ok(Err(e)) => Err(PipelineError::Upstream(e.to_string())),
            Err(e) => Err(PipelineError::Internal(anyhow!("dispatch task failed: {}", e))),
        }
    }
}

fn require_uid<'a>(booking: &'a BookingRef, trigger: &str) -> PipelineResult<&'a str> {
    booking
        .booking_uid()
        .ok_or_else(|| PipelineError::validation(format!("{} payload has no uid", trigger)))
}
