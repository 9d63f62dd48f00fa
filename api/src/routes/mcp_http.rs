use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use evalgate_mcp_runtime::{RouteError, RoutedReply};
use serde_json::Value;

use crate::error::AppError;
use crate::state::AppState;

pub const MCP_PATH: &str = "/mcp";
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";
pub const MCP_PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

pub fn router() -> Router<AppState> {
    Router::new().route(MCP_PATH, post(mcp_post).get(mcp_get).delete(mcp_delete))
}

/// No server-initiated stream is offered.
async fn mcp_get() -> Response {
    StatusCode::METHOD_NOT_ALLOWED.into_response()
}

fn session_id_from(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(MCP_SESSION_ID_HEADER)?;
    let value = String::from_utf8_lossy(raw.as_bytes()).trim().to_string();
    (!value.is_empty()).then_some(value)
}

async fn mcp_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let incoming: Value =
        serde_json::from_slice(&body).map_err(|e| AppError::Parse(e.to_string()))?;
    let session_id = session_id_from(&headers);

    // Detached so a client disconnect cannot cancel an upstream call mid-flight;
    // its result is simply dropped.
    let router = state.router.clone();
    let routed =
        tokio::spawn(async move { router.route(session_id.as_deref(), incoming).await }).await;

    let reply = match routed {
        Ok(result) => result?,
        Err(join_err) if join_err.is_panic() => {
            tracing::error!(
                event = "mcp_request_panicked",
                error = %join_err,
                "MCP request handler panicked; aborting"
            );
            std::process::abort();
        }
        Err(join_err) => return Err(AppError::Internal(join_err.to_string())),
    };

    Ok(render_reply(reply))
}

fn render_reply(reply: RoutedReply) -> Response {
    let RoutedReply {
        session_id,
        created,
        responses,
    } = reply;

    let mut response = match responses.len() {
        0 => StatusCode::ACCEPTED.into_response(),
        1 => (
            StatusCode::OK,
            Json(responses.into_iter().next().unwrap_or(Value::Null)),
        )
            .into_response(),
        _ => (StatusCode::OK, Json(Value::Array(responses))).into_response(),
    };

    if created {
        if let Some(value) = session_id.and_then(|id| HeaderValue::from_str(&id).ok()) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(MCP_SESSION_ID_HEADER), value);
        }
    }
    response
}

async fn mcp_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let session_id = session_id_from(&headers).ok_or(RouteError::SessionMissing)?;
    state.router.terminate(&session_id)?;
    tracing::info!(
        event = "mcp_session_terminated",
        session_id = %session_id,
        "MCP session terminated by client"
    );
    Ok(StatusCode::OK)
}
