use std::time::{Duration, Instant};

use async_trait::async_trait;
use evalgate_core::ids::credential_fingerprint;
use evalgate_core::upstream::{UpstreamConfigStatus, UpstreamEnvelope};
use serde_json::Value;
use thiserror::Error;
use url::Url;

const UPSTREAM_DETAIL_MAX_CHARS: usize = 300;

/// Failure of a single upstream call. Never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("Failed to reach upstream API: {message}")]
    Network { message: String },
    #[error("Upstream API returned HTTP {status}: {}", .detail.as_deref().unwrap_or("no detail provided"))]
    Status { status: u16, detail: Option<String> },
    #[error("Upstream API returned a malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Upstream API reported failure: {0}")]
    Rejected(String),
}

/// Missing or unusable upstream configuration. Fatal at startup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationFault {
    #[error("upstream base URL is not configured")]
    MissingBaseUrl,
    #[error("upstream base URL '{url}' is invalid: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("upstream API credential is not configured")]
    MissingCredential,
    #[error("failed to build upstream HTTP client: {0}")]
    Client(String),
}

/// The backend collaborator. One outbound request per call.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn test_connection(&self) -> Result<Value, UpstreamError>;
    async fn event_applications(&self, event_id: &str) -> Result<Value, UpstreamError>;
    async fn application_evaluations(&self, application_id: &str)
    -> Result<Value, UpstreamError>;
    async fn event_criteria(&self, event_id: &str) -> Result<Value, UpstreamError>;
    async fn event_questions(&self, event_id: &str) -> Result<Value, UpstreamError>;
    fn config_status(&self) -> UpstreamConfigStatus;
}

#[derive(Clone)]
pub struct UpstreamConfig {
    base_url: Url,
    api_key: String,
    timeout: Duration,
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &format!("<{}>", credential_fingerprint(&self.api_key)))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl UpstreamConfig {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ConfigurationFault> {
        let raw = base_url.trim();
        if raw.is_empty() {
            return Err(ConfigurationFault::MissingBaseUrl);
        }
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(ConfigurationFault::MissingCredential);
        }

        let parsed = Url::parse(raw).map_err(|e| ConfigurationFault::InvalidBaseUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
            return Err(ConfigurationFault::InvalidBaseUrl {
                url: raw.to_string(),
                reason: "scheme must be http or https".to_string(),
            });
        }
        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(ConfigurationFault::InvalidBaseUrl {
                url: raw.to_string(),
                reason: "credentials must not be embedded in the URL".to_string(),
            });
        }

        Ok(Self {
            base_url: parsed,
            api_key: api_key.to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    pub fn credential_fingerprint(&self) -> String {
        credential_fingerprint(&self.api_key)
    }

    pub fn status(&self) -> UpstreamConfigStatus {
        UpstreamConfigStatus {
            configured: true,
            base_url: self.base_url().to_string(),
            has_credential: !self.api_key.is_empty(),
        }
    }
}

/// Bearer-authenticated reqwest client for the upstream REST API.
pub struct HttpUpstreamClient {
    config: UpstreamConfig,
    http: reqwest::Client,
}

impl HttpUpstreamClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, ConfigurationFault> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("evalgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigurationFault::Client(e.to_string()))?;
        Ok(Self { config, http })
    }

    async fn get(&self, operation: &'static str, segments: &[&str]) -> Result<Value, UpstreamError> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| UpstreamError::Network {
                message: format!("base URL {} cannot carry a path", self.config.base_url()),
            })?
            .pop_if_empty()
            .extend(segments);

        let started = Instant::now();
        let response = self
            .http
            .get(url.clone())
            .bearer_auth(&self.config.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(
                    event = "upstream_request_failed",
                    operation = operation,
                    path = %url.path(),
                    error = %e,
                    "Upstream request could not be completed"
                );
                UpstreamError::Network {
                    message: format!("{} ({e})", self.config.base_url()),
                }
            })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| UpstreamError::Network {
            message: format!("failed to read response body: {e}"),
        })?;

        tracing::debug!(
            event = "upstream_response",
            operation = operation,
            path = %url.path(),
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            body_len = bytes.len(),
            "Upstream response received"
        );

        interpret_response(status.as_u16(), &bytes)
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn test_connection(&self) -> Result<Value, UpstreamError> {
        self.get("test_connection", &["api", "mcp", "test"]).await
    }

    async fn event_applications(&self, event_id: &str) -> Result<Value, UpstreamError> {
        self.get(
            "event_applications",
            &["api", "mcp", "events", event_id, "applications"],
        )
        .await
    }

    async fn application_evaluations(
        &self,
        application_id: &str,
    ) -> Result<Value, UpstreamError> {
        self.get(
            "application_evaluations",
            &["api", "mcp", "applications", application_id, "evaluations"],
        )
        .await
    }

    async fn event_criteria(&self, event_id: &str) -> Result<Value, UpstreamError> {
        self.get(
            "event_criteria",
            &["api", "mcp", "events", event_id, "criteria"],
        )
        .await
    }

    async fn event_questions(&self, event_id: &str) -> Result<Value, UpstreamError> {
        self.get(
            "event_questions",
            &["api", "mcp", "events", event_id, "questions"],
        )
        .await
    }

    fn config_status(&self) -> UpstreamConfigStatus {
        self.config.status()
    }
}

/// Map status + body onto the upstream envelope contract.
fn interpret_response(status: u16, body: &[u8]) -> Result<Value, UpstreamError> {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();

    if !(200..=299).contains(&status) {
        let detail = parsed
            .as_ref()
            .and_then(|value| serde_json::from_value::<UpstreamEnvelope>(value.clone()).ok())
            .and_then(|envelope| envelope.failure_text())
            .or_else(|| {
                let text = String::from_utf8_lossy(body);
                let text = text.trim();
                (!text.is_empty()).then(|| truncate_detail(text))
            });
        return Err(UpstreamError::Status { status, detail });
    }

    let Some(value) = parsed else {
        return Err(UpstreamError::MalformedPayload(
            "response body is not valid JSON".to_string(),
        ));
    };
    let envelope: UpstreamEnvelope = serde_json::from_value(value)
        .map_err(|e| UpstreamError::MalformedPayload(e.to_string()))?;

    if !envelope.success {
        return Err(UpstreamError::Rejected(
            envelope
                .failure_text()
                .unwrap_or_else(|| "success=false without error detail".to_string()),
        ));
    }

    Ok(envelope.data.unwrap_or(Value::Null))
}

fn truncate_detail(text: &str) -> String {
    if text.chars().count() <= UPSTREAM_DETAIL_MAX_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(UPSTREAM_DETAIL_MAX_CHARS).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use axum::Json;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use serde_json::json;

    use super::*;

    const TEST_KEY: &str = "test-api-key";

    async fn spawn_stub_upstream() -> String {
        async fn test_endpoint(headers: HeaderMap) -> Response {
            let authorized = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == format!("Bearer {TEST_KEY}"));
            if !authorized {
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "success": false, "error": "Invalid API key" })),
                )
                    .into_response();
            }
            Json(json!({
                "success": true,
                "data": { "message": "ok", "timestamp": "2024-05-01T12:00:00.000Z" }
            }))
            .into_response()
        }

        async fn applications(Path(event_id): Path<String>) -> Response {
            match event_id.as_str() {
                "boom" => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "success": false, "error": "Database unavailable" })),
                )
                    .into_response(),
                "missing" => Json(json!({ "success": false, "error": "Event not found" }))
                    .into_response(),
                "garbage" => (StatusCode::OK, "<html>oops</html>").into_response(),
                _ => Json(json!({
                    "success": true,
                    "data": [{ "id": "app-1", "eventId": event_id }]
                }))
                .into_response(),
            }
        }

        let app = axum::Router::new()
            .route("/api/mcp/test", get(test_endpoint))
            .route("/api/mcp/events/{event_id}/applications", get(applications));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("stub listener should bind");
        let addr = listener.local_addr().expect("stub addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("stub server should run");
        });
        format!("http://{addr}")
    }

    fn client_for(base_url: &str, key: &str) -> HttpUpstreamClient {
        HttpUpstreamClient::new(
            UpstreamConfig::new(base_url, key, Duration::from_secs(5)).expect("valid config"),
        )
        .expect("client should build")
    }

    #[test]
    fn config_rejects_missing_and_invalid_values() {
        let timeout = Duration::from_secs(1);
        assert_eq!(
            UpstreamConfig::new("  ", "key", timeout).unwrap_err(),
            ConfigurationFault::MissingBaseUrl
        );
        assert_eq!(
            UpstreamConfig::new("https://api.example.com", "", timeout).unwrap_err(),
            ConfigurationFault::MissingCredential
        );
        assert!(matches!(
            UpstreamConfig::new("not a url", "key", timeout).unwrap_err(),
            ConfigurationFault::InvalidBaseUrl { .. }
        ));
        assert!(matches!(
            UpstreamConfig::new("ftp://api.example.com", "key", timeout).unwrap_err(),
            ConfigurationFault::InvalidBaseUrl { .. }
        ));
        assert!(matches!(
            UpstreamConfig::new("https://user:pw@api.example.com", "key", timeout).unwrap_err(),
            ConfigurationFault::InvalidBaseUrl { .. }
        ));
    }

    #[test]
    fn config_status_and_debug_hide_the_credential() {
        let config =
            UpstreamConfig::new("https://api.example.com/", "super-secret", Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            config.status(),
            UpstreamConfigStatus {
                configured: true,
                base_url: "https://api.example.com".to_string(),
                has_credential: true,
            }
        );
        assert!(!format!("{config:?}").contains("super-secret"));
    }

    #[test]
    fn interpret_response_maps_envelope_contract() {
        assert_eq!(
            interpret_response(200, br#"{"success":true,"data":{"a":1}}"#).unwrap(),
            json!({ "a": 1 })
        );
        assert_eq!(
            interpret_response(200, br#"{"success":false,"message":"nope"}"#).unwrap_err(),
            UpstreamError::Rejected("nope".to_string())
        );
        assert_eq!(
            interpret_response(503, b"").unwrap_err(),
            UpstreamError::Status {
                status: 503,
                detail: None
            }
        );
        assert!(matches!(
            interpret_response(200, br#"{"data":[]}"#).unwrap_err(),
            UpstreamError::MalformedPayload(_)
        ));
    }

    #[test]
    fn status_error_message_includes_detail() {
        let err = UpstreamError::Status {
            status: 500,
            detail: Some("Database unavailable".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Upstream API returned HTTP 500: Database unavailable"
        );
    }

    #[tokio::test]
    async fn http_client_sends_bearer_credential() {
        let base = spawn_stub_upstream().await;
        let payload = client_for(&base, TEST_KEY)
            .test_connection()
            .await
            .expect("test_connection should succeed");
        assert_eq!(payload["timestamp"], "2024-05-01T12:00:00.000Z");

        let err = client_for(&base, "wrong-key")
            .test_connection()
            .await
            .expect_err("wrong key should be rejected");
        assert_eq!(
            err,
            UpstreamError::Status {
                status: 401,
                detail: Some("Invalid API key".to_string())
            }
        );
    }

    #[tokio::test]
    async fn http_client_maps_upstream_failures() {
        let base = spawn_stub_upstream().await;
        let client = client_for(&base, TEST_KEY);

        let ok = client.event_applications("evt-1").await.unwrap();
        assert_eq!(ok[0]["eventId"], "evt-1");

        assert!(matches!(
            client.event_applications("boom").await.unwrap_err(),
            UpstreamError::Status { status: 500, .. }
        ));
        assert_eq!(
            client.event_applications("missing").await.unwrap_err(),
            UpstreamError::Rejected("Event not found".to_string())
        );
        assert!(matches!(
            client.event_applications("garbage").await.unwrap_err(),
            UpstreamError::MalformedPayload(_)
        ));
    }

    #[tokio::test]
    async fn http_client_percent_encodes_identifiers() {
        let base = spawn_stub_upstream().await;
        let payload = client_for(&base, TEST_KEY)
            .event_applications("a b")
            .await
            .expect("encoded segment should route");
        assert_eq!(payload[0]["eventId"], "a b");
    }

    #[tokio::test]
    async fn http_client_reports_network_errors() {
        let err = client_for("http://127.0.0.1:9", TEST_KEY)
            .test_connection()
            .await
            .expect_err("nothing listens on the discard port");
        assert!(matches!(err, UpstreamError::Network { .. }));
    }
}
