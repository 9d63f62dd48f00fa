use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, SecondsFormat, Utc};
use evalgate_core::error::{ErrorDetail, codes};
use evalgate_core::upstream::UpstreamConfigStatus;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::protocol::{RpcError, to_pretty_json};
use crate::tools::{ToolCall, ToolRegistry};
use crate::upstream::UpstreamClient;

/// Rejections that happen before any upstream call is attempted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments {
        tool: String,
        field: String,
        reason: String,
    },
}

impl DispatchError {
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            DispatchError::UnknownTool(name) => RpcError::invalid_params(self.to_string())
                .with_detail(
                    ErrorDetail::new(codes::UNKNOWN_TOOL)
                        .with_tool(name.clone())
                        .with_docs_hint("Call tools/list for the available tool names."),
                ),
            DispatchError::InvalidArguments { tool, field, .. } => {
                RpcError::invalid_params(self.to_string()).with_detail(
                    ErrorDetail::new(codes::INVALID_ARGUMENTS)
                        .with_tool(tool.clone())
                        .with_field(field.clone()),
                )
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolFailure {
    pub tool: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ToolFailure {
    pub fn to_value(&self) -> Value {
        json!({
            "success": false,
            "error": codes::UPSTREAM_FAILURE,
            "message": self.message,
            "tool": self.tool,
            "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }
}

/// Outcome of exactly one tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationResult {
    Success {
        tool: String,
        content: Value,
        text: String,
    },
    Failure(ToolFailure),
}

impl InvocationResult {
    pub fn success(tool: &str, content: Value) -> Self {
        let text = to_pretty_json(&content);
        InvocationResult::Success {
            tool: tool.to_string(),
            content,
            text,
        }
    }

    pub fn failure(tool: &str, message: impl Into<String>) -> Self {
        InvocationResult::Failure(ToolFailure {
            tool: tool.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, InvocationResult::Failure(_))
    }

    pub fn tool(&self) -> &str {
        match self {
            InvocationResult::Success { tool, .. } => tool,
            InvocationResult::Failure(failure) => &failure.tool,
        }
    }

    /// Render as an MCP `tools/call` result: one text block, tagged success/error.
    pub fn to_call_result(&self) -> Value {
        match self {
            InvocationResult::Success {
                tool,
                content,
                text,
            } => json!({
                "content": [{ "type": "text", "text": text }],
                "structuredContent": {
                    "status": "complete",
                    "tool": tool,
                    "data": content,
                },
                "isError": false
            }),
            InvocationResult::Failure(failure) => {
                let envelope = failure.to_value();
                json!({
                    "content": [{ "type": "text", "text": to_pretty_json(&envelope) }],
                    "structuredContent": envelope,
                    "isError": true
                })
            }
        }
    }
}

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    upstream: Arc<dyn UpstreamClient>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, upstream: Arc<dyn UpstreamClient>) -> Self {
        Self { registry, upstream }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn upstream_status(&self) -> UpstreamConfigStatus {
        self.upstream.config_status()
    }

    /// Validate and run a tool. Upstream failures come back as `InvocationResult::Failure`;
    /// only pre-flight rejections are errors.
    pub async fn invoke(
        &self,
        name: &str,
        args: &Map<String, Value>,
    ) -> Result<InvocationResult, DispatchError> {
        let call = self.registry.resolve(name, args)?;
        Ok(self.execute(call).await)
    }

    pub async fn execute(&self, call: ToolCall) -> InvocationResult {
        let tool = call.name();
        let started = Instant::now();

        let outcome = match &call {
            ToolCall::TestConnection => self.upstream.test_connection().await.map(|upstream| {
                json!({
                    "status": "connected",
                    "upstream": upstream,
                    "configuration": self.upstream.config_status(),
                })
            }),
            ToolCall::ListApplications(args) => {
                self.upstream.event_applications(&args.event_id).await
            }
            ToolCall::ListEvaluations(args) => {
                self.upstream
                    .application_evaluations(&args.application_id)
                    .await
            }
            ToolCall::ListCriteria(args) => self.upstream.event_criteria(&args.event_id).await,
            ToolCall::ListQuestions(args) => self.upstream.event_questions(&args.event_id).await,
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(payload) => {
                tracing::debug!(
                    event = "tool_dispatch_succeeded",
                    tool = tool,
                    elapsed_ms = elapsed_ms,
                    "Tool invocation succeeded"
                );
                InvocationResult::success(tool, payload)
            }
            Err(err) => {
                tracing::warn!(
                    event = "tool_dispatch_failed",
                    tool = tool,
                    elapsed_ms = elapsed_ms,
                    error = %err,
                    "Tool invocation failed upstream"
                );
                InvocationResult::failure(tool, err.to_string())
            }
        }
    }
}
