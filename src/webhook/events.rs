//! Typed webhook payloads.
//!
//! Deliveries arrive as `{triggerEvent, createdAt, payload}`. The envelope is
//! parsed first and the payload is then decoded into the variant matching the
//! trigger, so handler code never touches untyped JSON.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::PipelineError;

pub mod triggers {
    pub const BOOKING_CREATED: &str = "BOOKING_CREATED";
    pub const BOOKING_CANCELLED: &str = "BOOKING_CANCELLED";
    pub const MEETING_ENDED: &str = "MEETING_ENDED";
    pub const RECORDING_READY: &str = "RECORDING_READY";
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    trigger_event: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    BookingCreated(BookingPayload),
    BookingCancelled(BookingRef),
    MeetingEnded(BookingRef),
    RecordingReady(RecordingReadyPayload),
    /// Any trigger we do not act on, including the platform's PING.
    Ignored { trigger_event: String },
}

impl WebhookEvent {
    /// Decode a verified request body.
    pub fn parse(raw_body: &[u8]) -> Result<Self, PipelineError> {
        let envelope: Envelope = serde_json::from_slice(raw_body)
            .map_err(|e| PipelineError::validation(format!("malformed webhook body: {}", e)))?;

        let event = match envelope.trigger_event.as_str() {
            triggers::BOOKING_CREATED => Self::BookingCreated(decode(&envelope)?),
            triggers::BOOKING_CANCELLED => Self::BookingCancelled(decode(&envelope)?),
            triggers::MEETING_ENDED => Self::MeetingEnded(decode(&envelope)?),
            triggers::RECORDING_READY => Self::RecordingReady(decode(&envelope)?),
            other => Self::Ignored {
                trigger_event: other.to_string(),
            },
        };

        Ok(event)
    }

    pub fn trigger_event(&self) -> &str {
        match self {
            Self::BookingCreated(_) => triggers::BOOKING_CREATED,
            Self::BookingCancelled(_) => triggers::BOOKING_CANCELLED,
            Self::MeetingEnded(_) => triggers::MEETING_ENDED,
            Self::RecordingReady(_) => triggers::RECORDING_READY,
            Self::Ignored { trigger_event } => trigger_event,
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(envelope: &Envelope) -> Result<T, PipelineError> {
    let payload = if envelope.payload.is_null() {
        Value::Object(Default::default())
    } else {
        envelope.payload.clone()
    };

    serde_json::from_value(payload).map_err(|e| {
        PipelineError::validation(format!(
            "invalid {} payload: {}",
            envelope.trigger_event, e
        ))
    })
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPoint {
    pub entry_point_type: Option<String>,
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceData {
    #[serde(default)]
    pub entry_points: Vec<EntryPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VideoCallData {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingPayload {
    pub uid: Option<String>,
    pub title: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub organizer: Option<Person>,
    #[serde(default)]
    pub attendees: Vec<Person>,
    pub location: Option<String>,
    pub conference_data: Option<ConferenceData>,
    pub video_call_data: Option<VideoCallData>,
    /// Free-form booking metadata; only `videoCallUrl` is read.
    #[serde(default)]
    pub metadata: Value,
}

impl BookingPayload {
    pub fn start(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.start_time.as_deref())
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.end_time.as_deref())
    }

    pub fn organizer_email(&self) -> Option<&str> {
        self.organizer.as_ref()?.email.as_deref()
    }

    /// First attendee whose email is not the organizer's.
    pub fn client(&self) -> Option<&Person> {
        let organizer = self.organizer_email().map(str::to_lowercase);
        self.attendees.iter().find(|attendee| match attendee.email.as_deref() {
            Some(email) => organizer.as_deref() != Some(email.to_lowercase().as_str()),
            None => false,
        })
    }

    pub fn metadata_video_url(&self) -> Option<&str> {
        self.metadata.get("videoCallUrl")?.as_str()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRef {
    pub uid: Option<String>,
    pub booking_uid: Option<String>,
}

impl BookingRef {
    pub fn booking_uid(&self) -> Option<&str> {
        first_present(&self.uid, &self.booking_uid)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingReadyPayload {
    pub uid: Option<String>,
    pub booking_uid: Option<String>,
    pub download_url: Option<String>,
    pub download_link: Option<String>,
}

impl RecordingReadyPayload {
    pub fn booking_uid(&self) -> Option<&str> {
        first_present(&self.uid, &self.booking_uid)
    }

    pub fn download_url(&self) -> Option<&str> {
        first_present(&self.download_url, &self.download_link)
    }
}

fn first_present<'a>(primary: &'a Option<String>, fallback: &'a Option<String>) -> Option<&'a str> {
    [primary, fallback]
        .into_iter()
        .filter_map(|v| v.as_deref().map(str::trim))
        .find(|v| !v.is_empty())
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value?.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `round((end - start) / 60s)`; `None` unless both are known and ordered.
pub fn duration_minutes(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Option<i64> {
    let (start, end) = (start?, end?);
    if end < start {
        return None;
    }
    let seconds = (end - start).num_seconds() as f64;
    Some((seconds / 60.0).round() as i64)
}
