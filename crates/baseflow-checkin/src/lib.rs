#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]
#![deny(clippy::cast_precision_loss)]
#![deny(clippy::cast_possible_truncation)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::cast_sign_loss)]
#![deny(clippy::disallowed_types)]

//! Client for the external check-in mini-app API.
//!
//! One bounded request per fetch, no retries: the caller's policy is to fall
//! back to local state on any failure, so retrying here would only delay
//! that decision. Every failure is a typed error, never a panic.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Configuration for the check-in API client.
#[derive(Debug, Clone)]
pub struct CheckInApiConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl CheckInApiConfig {
    pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn from_env() -> Result<Self, CheckInApiError> {
        let base_url = std::env::var("BASEFLOW_CHECKIN_API_URL")
            .map_err(|_| CheckInApiError::Config("BASEFLOW_CHECKIN_API_URL is not set".into()))?;
        if base_url.trim().is_empty() {
            return Err(CheckInApiError::Config(
                "BASEFLOW_CHECKIN_API_URL is empty".into(),
            ));
        }
        let timeout_ms = std::env::var("BASEFLOW_CHECKIN_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Self::DEFAULT_TIMEOUT_MS);
        Ok(Self {
            base_url,
            timeout_ms,
        })
    }
}

#[derive(Debug, Error)]
pub enum CheckInApiError {
    #[error("config error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("http status {status} body={body}")]
    HttpStatus { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
}

/// Remote streak report, `GET /api/streak`.
///
/// Both fields default to zero so a shape deviation degrades to a zero
/// report instead of a hard decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCheckIn {
    #[serde(default)]
    pub streak: u64,
    #[serde(default)]
    pub total: u64,
}

#[derive(Clone)]
pub struct CheckInApiClient {
    cfg: CheckInApiConfig,
    client: reqwest::Client,
}

impl CheckInApiClient {
    /// Build a client. Construction is infallible: if the builder fails the
    /// default client (without the configured timeout) is used instead.
    pub fn new(cfg: CheckInApiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { cfg, client }
    }

    /// Fetch the remote streak report for an address.
    ///
    /// Issues a single request with a cache-busting timestamp parameter.
    pub async fn fetch(&self, address: &str) -> Result<RemoteCheckIn, CheckInApiError> {
        let base = self.cfg.base_url.trim_end_matches('/');
        let url = format!("{base}/api/streak?address={address}&t={}", now_ms());
        debug!(%address, "fetching remote check-in state");

        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| CheckInApiError::Network(e.to_string()))?;
        if !status.is_success() {
            warn!(%address, status = status.as_u16(), "check-in API returned non-success");
            return Err(CheckInApiError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| CheckInApiError::Decode(e.to_string()))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> CheckInApiError {
    if err.is_body() || err.is_decode() {
        return CheckInApiError::Decode(err.to_string());
    }
    CheckInApiError::Network(err.to_string())
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> CheckInApiClient {
        CheckInApiClient::new(CheckInApiConfig {
            base_url: server.uri(),
            timeout_ms: 1_000,
        })
    }

    #[tokio::test]
    async fn fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/streak"))
            .and(query_param("address", "0xabc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"streak": 7, "total": 21})),
            )
            .mount(&server)
            .await;

        let report = client_for(&server).fetch("0xabc").await.unwrap();
        assert_eq!(
            report,
            RemoteCheckIn {
                streak: 7,
                total: 21
            }
        );
    }

    #[tokio::test]
    async fn missing_fields_default_to_zero() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/streak"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let report = client_for(&server).fetch("0xabc").await.unwrap();
        assert_eq!(report, RemoteCheckIn { streak: 0, total: 0 });
    }

    #[tokio::test]
    async fn non_success_status_is_typed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/streak"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .expect(1) // exactly one attempt: no retries
            .mount(&server)
            .await;

        let err = client_for(&server).fetch("0xabc").await.unwrap_err();
        match err {
            CheckInApiError::HttpStatus { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/streak"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).fetch("0xabc").await.unwrap_err();
        assert!(matches!(err, CheckInApiError::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        // Port 9 (discard) is almost certainly closed.
        let client = CheckInApiClient::new(CheckInApiConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_ms: 200,
        });
        let err = client.fetch("0xabc").await.unwrap_err();
        assert!(matches!(err, CheckInApiError::Network(_)));
    }
}
