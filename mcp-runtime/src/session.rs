use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value, json};
use tokio::sync::mpsc;

use crate::dispatch::ToolDispatcher;
use crate::protocol::{
    RpcError, error_response, negotiate_protocol_version, success_response,
};
use crate::{MCP_SERVER_NAME, SERVER_INSTRUCTIONS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Client terminated the session (HTTP DELETE).
    ClientTerminated,
    /// Process shutdown.
    Shutdown,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::ClientTerminated => "client_terminated",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

/// Lifecycle notifications from a session context to the store's reaper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Closed {
        session_id: String,
        reason: CloseReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextState {
    AwaitingHandshake,
    /// `initialize` answered; tools are available.
    Initialized,
    /// Client also sent `notifications/initialized`.
    Ready,
    Closed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub name: String,
    pub version: Option<String>,
}

/// Protocol state for one client session: handshake enforcement and method routing.
pub struct SessionContext {
    session_id: String,
    dispatcher: Arc<ToolDispatcher>,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: ContextState,
    protocol_version: Option<&'static str>,
    client_info: Option<ClientInfo>,
    tool_calls: u64,
}

impl SessionContext {
    pub fn new(
        session_id: String,
        dispatcher: Arc<ToolDispatcher>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            session_id,
            dispatcher,
            events,
            state: ContextState::AwaitingHandshake,
            protocol_version: None,
            client_info: None,
            tool_calls: 0,
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, ContextState::Initialized | ContextState::Ready)
    }

    pub fn is_closed(&self) -> bool {
        self.state == ContextState::Closed
    }

    pub fn protocol_version(&self) -> Option<&'static str> {
        self.protocol_version
    }

    pub fn client_info(&self) -> Option<&ClientInfo> {
        self.client_info.as_ref()
    }

    pub fn tool_calls(&self) -> u64 {
        self.tool_calls
    }

    /// Close the context and notify the reaper. Returns false if already closed.
    pub fn close(&mut self, reason: CloseReason) -> bool {
        if self.state == ContextState::Closed {
            return false;
        }
        self.state = ContextState::Closed;
        tracing::info!(
            event = "mcp_session_context_closed",
            session_id = %self.session_id,
            reason = reason.as_str(),
            tool_calls = self.tool_calls,
            "MCP session context closed"
        );
        // The reaper is gone only during runtime teardown; nothing left to notify then.
        let _ = self.events.send(SessionEvent::Closed {
            session_id: self.session_id.clone(),
            reason,
        });
        true
    }

    /// Handle a single message or a batch. Returns one response per request;
    /// notifications and client responses produce none.
    pub async fn handle_incoming(&mut self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&mut self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // A client response; this server never issues outbound requests.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        if let Some(id) = obj.get("id").cloned() {
            let result = self.handle_request(&id, method, params).await;
            Some(match result {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            })
        } else {
            self.handle_notification(method);
            None
        }
    }

    fn handle_notification(&mut self, method: &str) {
        match method {
            "notifications/initialized" if self.state == ContextState::Initialized => {
                self.state = ContextState::Ready;
            }
            // Unknown notifications are ignored.
            _ => {}
        }
    }

    async fn handle_request(
        &mut self,
        id: &Value,
        method: &str,
        params: Value,
    ) -> Result<Value, RpcError> {
        if self.state == ContextState::Closed {
            return Err(RpcError::invalid_request("Session is closed"));
        }

        match method {
            "initialize" => self.handle_initialize(params),
            "ping" => Ok(json!({})),
            _ if !self.is_initialized() => Err(RpcError::invalid_request(
                "Session not initialized: send initialize first",
            )),
            "tools/list" => Ok(self.dispatcher.registry().list_payload()),
            "tools/call" => self.handle_tools_call(id, params).await,
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn handle_initialize(&mut self, params: Value) -> Result<Value, RpcError> {
        if self.state != ContextState::AwaitingHandshake {
            return Err(RpcError::invalid_request("Session already initialized"));
        }

        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("initialize params must be an object"))?;
        let requested = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RpcError::invalid_params("initialize requires string field 'protocolVersion'")
            })?;

        let client_info = params.get("clientInfo").and_then(Value::as_object).map(|info| {
            ClientInfo {
                name: info
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                version: info
                    .get("version")
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned),
            }
        });

        let negotiated = negotiate_protocol_version(requested);
        self.protocol_version = Some(negotiated);
        self.state = ContextState::Initialized;

        tracing::info!(
            event = "mcp_session_initialized",
            session_id = %self.session_id,
            requested_protocol_version = %requested,
            protocol_version = negotiated,
            client_name = ?client_info.as_ref().map(|info| info.name.as_str()),
            client_version = ?client_info.as_ref().and_then(|info| info.version.as_deref()),
            "MCP session handshake completed"
        );
        self.client_info = client_info;

        Ok(json!({
            "protocolVersion": negotiated,
            "capabilities": {
                "tools": {
                    "listChanged": false
                }
            },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": SERVER_INSTRUCTIONS
        }))
    }

    async fn handle_tools_call(&mut self, id: &Value, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        self.tool_calls += 1;
        let started = Instant::now();
        let result = self.dispatcher.invoke(name, &args).await.map_err(|err| {
            tracing::info!(
                event = "mcp_tool_call_rejected",
                session_id = %self.session_id,
                request_id = %id,
                tool = %name,
                reason = %err,
                "MCP tool call rejected before dispatch"
            );
            err.to_rpc_error()
        })?;

        tracing::info!(
            event = "mcp_tool_call",
            session_id = %self.session_id,
            request_id = %id,
            tool = result.tool(),
            is_error = result.is_error(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "MCP tool call completed"
        );
        Ok(result.to_call_result())
    }
}
