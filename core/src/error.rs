use serde::Serialize;

/// Error codes shared by the HTTP surface and tool results.
pub mod codes {
    pub const SESSION_MISSING: &str = "session_missing";
    pub const SESSION_INVALID: &str = "session_invalid";
    pub const UNKNOWN_TOOL: &str = "unknown_tool";
    pub const INVALID_ARGUMENTS: &str = "invalid_arguments";
    pub const UPSTREAM_FAILURE: &str = "upstream_failure";
    pub const CONFIGURATION_FAULT: &str = "configuration_fault";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// JSON-RPC 2.0 error codes.
pub mod rpc_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Non-handshake request without a session identifier.
    pub const SESSION_MISSING: i64 = -32000;
    /// Session identifier unknown or already closed.
    pub const SESSION_INVALID: i64 = -32001;
}

/// Structured error detail attached to JSON-RPC errors as `data`.
/// Carries enough for an agent to correct the call without a second round-trip.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Machine-readable error code (see [`codes`])
    pub error: String,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Tool the error relates to (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

impl ErrorDetail {
    pub fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
            field: None,
            tool: None,
            docs_hint: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn with_docs_hint(mut self, docs_hint: impl Into<String>) -> Self {
        self.docs_hint = Some(docs_hint.into());
        self
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn error_detail_omits_empty_fields() {
        let detail = ErrorDetail::new(codes::INVALID_ARGUMENTS).with_field("eventId");
        assert_eq!(
            detail.to_value(),
            json!({ "error": "invalid_arguments", "field": "eventId" })
        );
    }
}
