use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use evalgate_core::upstream::UpstreamConfigStatus;
use serde_json::{Value, json};

use crate::dispatch::ToolDispatcher;
use crate::tools::ToolRegistry;
use crate::upstream::{UpstreamClient, UpstreamError};

pub(crate) const STUB_TIMESTAMP: &str = "2024-01-01T00:00:00.000Z";
pub(crate) const STUB_FAILURE: &str = "stub upstream exploded";

/// In-memory upstream that echoes identifiers and counts calls.
pub(crate) struct StubUpstream {
    calls: AtomicUsize,
    fail_applications: AtomicBool,
}

impl StubUpstream {
    pub(crate) fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_applications: AtomicBool::new(false),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_applications(&self, fail: bool) {
        self.fail_applications.store(fail, Ordering::SeqCst);
    }

    async fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Give other tasks a chance to interleave with this "network" call.
        tokio::task::yield_now().await;
    }
}

#[async_trait]
impl UpstreamClient for StubUpstream {
    async fn test_connection(&self) -> Result<Value, UpstreamError> {
        self.record().await;
        Ok(json!({ "message": "Connection successful", "timestamp": STUB_TIMESTAMP }))
    }

    async fn event_applications(&self, event_id: &str) -> Result<Value, UpstreamError> {
        self.record().await;
        if self.fail_applications.load(Ordering::SeqCst) {
            return Err(UpstreamError::Status {
                status: 500,
                detail: Some(STUB_FAILURE.to_string()),
            });
        }
        Ok(json!([{ "id": format!("app-for-{event_id}"), "eventId": event_id }]))
    }

    async fn application_evaluations(
        &self,
        application_id: &str,
    ) -> Result<Value, UpstreamError> {
        self.record().await;
        Ok(json!([{ "applicationId": application_id, "score": 7 }]))
    }

    async fn event_criteria(&self, event_id: &str) -> Result<Value, UpstreamError> {
        self.record().await;
        Ok(json!([{ "eventId": event_id, "name": "Impact" }]))
    }

    async fn event_questions(&self, event_id: &str) -> Result<Value, UpstreamError> {
        self.record().await;
        Ok(json!([{ "eventId": event_id, "question": "Why?" }]))
    }

    fn config_status(&self) -> UpstreamConfigStatus {
        UpstreamConfigStatus {
            configured: true,
            base_url: "http://stub.invalid".to_string(),
            has_credential: true,
        }
    }
}

pub(crate) fn dispatcher_for(stub: Arc<StubUpstream>) -> Arc<ToolDispatcher> {
    Arc::new(ToolDispatcher::new(Arc::new(ToolRegistry::builtin()), stub))
}

pub(crate) fn initialize_request(id: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-06-18",
            "capabilities": {},
            "clientInfo": { "name": "test-client", "version": "0.0.1" }
        }
    })
}

pub(crate) fn request(id: Value, method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
}

pub(crate) fn tools_call(id: Value, name: &str, arguments: Value) -> Value {
    request(id, "tools/call", json!({ "name": name, "arguments": arguments }))
}
