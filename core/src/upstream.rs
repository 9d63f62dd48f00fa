use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Response envelope returned by every upstream endpoint.
///
/// `data` is opaque to the gateway: it is forwarded to the caller as-is.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamEnvelope {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl UpstreamEnvelope {
    /// Best human-readable failure text carried by the envelope, if any.
    pub fn failure_text(&self) -> Option<String> {
        match (self.error.as_deref(), self.message.as_deref()) {
            (Some(error), Some(message)) if error != message => Some(format!("{error}: {message}")),
            (Some(error), _) => Some(error.to_string()),
            (None, Some(message)) => Some(message.to_string()),
            (None, None) => None,
        }
    }
}

/// Configuration health of the upstream client, as reported by `/health`
/// and the `test_connection` tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamConfigStatus {
    /// True when both the base URL and a credential are present
    pub configured: bool,
    /// Upstream base URL (no credentials embedded)
    pub base_url: String,
    /// Whether an API credential is configured
    pub has_credential: bool,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn envelope_defaults_optional_fields() {
        let envelope: UpstreamEnvelope = serde_json::from_value(json!({ "success": true })).unwrap();
        assert!(envelope.success);
        assert!(envelope.data.is_none());
        assert!(envelope.failure_text().is_none());
    }

    #[test]
    fn failure_text_combines_error_and_message() {
        let envelope: UpstreamEnvelope = serde_json::from_value(json!({
            "success": false,
            "error": "Event not found",
            "message": "No event with id 42"
        }))
        .unwrap();
        assert_eq!(
            envelope.failure_text().as_deref(),
            Some("Event not found: No event with id 42")
        );
    }

    #[test]
    fn config_status_serializes_camel_case() {
        let status = UpstreamConfigStatus {
            configured: true,
            base_url: "https://api.example.com".to_string(),
            has_credential: true,
        };
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({
                "configured": true,
                "baseUrl": "https://api.example.com",
                "hasCredential": true
            })
        );
    }
}
