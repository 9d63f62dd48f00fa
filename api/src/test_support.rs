use std::sync::Arc;

use async_trait::async_trait;
use evalgate_core::upstream::UpstreamConfigStatus;
use evalgate_mcp_runtime::{DEFAULT_SESSION_IDLE_TTL, UpstreamClient, UpstreamError};
use serde_json::{Value, json};

use crate::state::AppState;

/// Upstream that answers every operation with a fixed payload; criteria always fail.
struct FixedUpstream;

#[async_trait]
impl UpstreamClient for FixedUpstream {
    async fn test_connection(&self) -> Result<Value, UpstreamError> {
        Ok(json!({ "message": "Connection successful", "timestamp": "2024-01-01T00:00:00.000Z" }))
    }

    async fn event_applications(&self, event_id: &str) -> Result<Value, UpstreamError> {
        Ok(json!([{ "id": "app-1", "eventId": event_id }]))
    }

    async fn application_evaluations(
        &self,
        application_id: &str,
    ) -> Result<Value, UpstreamError> {
        Ok(json!([{ "applicationId": application_id }]))
    }

    async fn event_criteria(&self, _event_id: &str) -> Result<Value, UpstreamError> {
        Err(UpstreamError::Rejected("Event not found".to_string()))
    }

    async fn event_questions(&self, event_id: &str) -> Result<Value, UpstreamError> {
        Ok(json!([{ "eventId": event_id }]))
    }

    fn config_status(&self) -> UpstreamConfigStatus {
        UpstreamConfigStatus {
            configured: true,
            base_url: "http://stub.invalid".to_string(),
            has_credential: true,
        }
    }
}

/// App state over the fixed upstream, with its reaper running.
pub(crate) fn test_state() -> AppState {
    let (state, reaper) = AppState::new(Arc::new(FixedUpstream), DEFAULT_SESSION_IDLE_TTL);
    tokio::spawn(reaper.run());
    state
}
