//! Read-only client for the scheduling platform's REST API.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::artifact::TranscriptArtifact;
use super::RetryError;
use crate::config::PlatformConfig;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlatformBooking {
    pub id: i64,
    #[serde(default)]
    pub uid: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlatformRecording {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub status: Option<String>,
    pub start_ts: Option<i64>,
    pub download_link: Option<String>,
}

impl PlatformRecording {
    pub fn is_finished(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("finished"))
    }
}

/// Most recent by `start_ts`; the last listed when no timestamps exist.
pub fn latest_recording(recordings: &[PlatformRecording]) -> Option<&PlatformRecording> {
    recordings
        .iter()
        .filter(|r| r.start_ts.is_some())
        .max_by_key(|r| r.start_ts)
        .or_else(|| recordings.last())
}

#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn list_bookings(&self) -> Result<Vec<PlatformBooking>, RetryError>;

    async fn list_recordings(&self, booking_id: i64) -> Result<Vec<PlatformRecording>, RetryError>;

    async fn list_transcripts(
        &self,
        booking_id: i64,
        recording_id: &str,
    ) -> Result<Vec<TranscriptArtifact>, RetryError>;

    async fn download(&self, url: &str) -> Result<String, RetryError>;
}

#[derive(Debug, Deserialize)]
struct BookingsResponse {
    #[serde(default)]
    bookings: Vec<PlatformBooking>,
}

/// Client for the v1 API, authenticated with an `apiKey` query parameter.
pub struct CalPlatformClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    metadata_timeout: Duration,
    listing_timeout: Duration,
    download_timeout: Duration,
}

impl CalPlatformClient {
    pub fn new(config: &PlatformConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            metadata_timeout: config.metadata_timeout(),
            listing_timeout: config.listing_timeout(),
            download_timeout: config.download_timeout(),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        timeout: Duration,
    ) -> Result<T, RetryError> {
        let url = format!("{}{}", self.api_base, path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[("apiKey", self.api_key.as_str())])
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| RetryError::Upstream(format!("GET {}: {}", path, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RetryError::Upstream(format!("GET {}: {}", path, e)))?;

        if !status.is_success() {
            return Err(RetryError::Upstream(format!(
                "GET {} returned {}",
                path, status
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| RetryError::Upstream(format!("GET {}: unexpected response: {}", path, e)))
    }
}

#[async_trait]
impl PlatformApi for CalPlatformClient {
    async fn list_bookings(&self) -> Result<Vec<PlatformBooking>, RetryError> {
        let response: BookingsResponse = self.get_json("/bookings", self.listing_timeout).await?;
        Ok(response.bookings)
    }

    async fn list_recordings(&self, booking_id: i64) -> Result<Vec<PlatformRecording>, RetryError> {
        self.get_json(
            &format!("/bookings/{}/recordings", booking_id),
            self.metadata_timeout,
        )
        .await
    }

    async fn list_transcripts(
        &self,
        booking_id: i64,
        recording_id: &str,
    ) -> Result<Vec<TranscriptArtifact>, RetryError> {
        self.get_json(
            &format!("/bookings/{}/transcripts/{}", booking_id, recording_id),
            self.metadata_timeout,
        )
        .await
    }

    async fn download(&self, url: &str) -> Result<String, RetryError> {
        let response = self
            .client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(|e| RetryError::DownloadFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetryError::DownloadFailed(format!(
                "artifact download returned {}",
                status
            )));
        }

        response
            .text()
            .await
            .map_err(|e| RetryError::DownloadFailed(e.to_string()))
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    fn recording(id: &str, status: &str, start_ts: Option<i64>) -> PlatformRecording {
        PlatformRecording {
            id: id.into(),
            status: Some(status.into()),
            start_ts,
            download_link: None,
        }
    }

    #[test]
    fn test_latest_recording_by_start() {
        let recordings = vec![
            recording("a", "finished", Some(200)),
            recording("b", "processing", Some(300)),
            recording("c", "finished", Some(100)),
        ];
        assert_eq!(latest_recording(&recordings).unwrap().id, "b");

        let untimed = vec![recording("a", "finished", None), recording("b", "finished", None)];
        assert_eq!(latest_recording(&untimed).unwrap().id, "b");
        assert!(latest_recording(&[]).is_none());
    }

    #[test]
    fn test_recording_ids_accept_numbers() {
        let parsed: Vec<PlatformRecording> = serde_json::from_value(json!([
            {"id": 12, "status": "finished", "start_ts": 1700000000, "download_link": "https://x/r.mp4"},
            {"id": "rec-2", "status": "in-progress"}
        ]))
        .unwrap();
        assert_eq!(parsed[0].id, "12");
        assert!(parsed[0].is_finished());
        assert!(!parsed[1].is_finished());
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn client_for(api_base: String) -> CalPlatformClient {
        CalPlatformClient::new(&PlatformConfig {
            api_base,
            api_key: "cal_key".into(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_client_sends_api_key_and_parses() {
        let app = Router::new()
            .route(
                "/v1/bookings",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    if params.get("apiKey").map(String::as_str) != Some("cal_key") {
                        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "no"})));
                    }
                    (
                        StatusCode::OK,
                        Json(json!({"bookings": [{"id": 7, "uid": "b1", "title": "Intro"}]})),
                    )
                }),
            )
            .route(
                "/v1/bookings/7/transcripts/rec-1",
                get(|| async { Json(json!([{"format": "txt", "link": "https://x/t.txt"}])) }),
            );
        let client = client_for(serve(app).await);

        let bookings = client.list_bookings().await.unwrap();
        assert_eq!(
            bookings,
            vec![PlatformBooking {
                id: 7,
                uid: "b1".into()
            }]
        );

        let artifacts = client.list_transcripts(7, "rec-1").await.unwrap();
        assert_eq!(artifacts[0].link, "https://x/t.txt");
    }

    #[tokio::test]
    async fn test_non_2xx_is_upstream_error() {
        let app = Router::new().route(
            "/v1/bookings/7/recordings",
            get(|| async { (StatusCode::BAD_GATEWAY, "down") }),
        );
        let client = client_for(serve(app).await);
        assert!(matches!(
            client.list_recordings(7).await,
            Err(RetryError::Upstream(_))
        ));
    }

    #[tokio::test]
    async fn test_download_failure() {
        let base = serve(Router::new().route("/v1/file", get(|| async { "artifact body" }))).await;
        let client = client_for(base.clone());

        assert_eq!(
            client.download(&format!("{}/file", base)).await.unwrap(),
            "artifact body"
        );
        assert!(matches!(
            client.download(&format!("{}/missing", base)).await,
            Err(RetryError::DownloadFailed(_))
        ));
    }
}
