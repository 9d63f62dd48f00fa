use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use evalgate_core::error::{ErrorDetail, codes};
use evalgate_mcp_runtime::RouteError;
use evalgate_mcp_runtime::protocol::{RpcError, error_response};
use serde_json::{Value, json};
use thiserror::Error;

/// Transport-level failures, rendered as JSON-RPC error bodies.
#[derive(Debug, Error)]
pub enum AppError {
    /// Session missing (400) or unknown (404)
    #[error(transparent)]
    Route(#[from] RouteError),
    /// Body is not JSON; answered with a JSON-RPC parse error (200)
    #[error("Parse error: {0}")]
    Parse(String),
    /// Internal error (500)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, rpc) = match &self {
            AppError::Route(err) => {
                let status = match err {
                    RouteError::SessionMissing => StatusCode::BAD_REQUEST,
                    RouteError::SessionInvalid { .. } => StatusCode::NOT_FOUND,
                };
                tracing::info!(
                    event = "mcp_request_rejected",
                    code = err.code(),
                    request_id = %request_id,
                    "MCP request rejected by session routing"
                );
                (status, err.to_rpc_error())
            }
            AppError::Parse(detail) => {
                tracing::debug!(
                    event = "mcp_parse_error",
                    request_id = %request_id,
                    detail = %detail,
                    "MCP request body is not valid JSON"
                );
                (StatusCode::OK, RpcError::parse_error())
            }
            AppError::Internal(msg) => {
                tracing::error!(
                    event = "internal_error",
                    request_id = %request_id,
                    error = %msg,
                    "Internal error"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    RpcError::internal("An internal error occurred")
                        .with_detail(ErrorDetail::new(codes::INTERNAL_ERROR)),
                )
            }
        };

        let mut body = error_response(Value::Null, rpc);
        body["error"]["data"]["request_id"] = json!(request_id);
        (status, Json(body)).into_response()
    }
}
