use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::CorsLayer;

use crate::routes::mcp_http::{MCP_PROTOCOL_VERSION_HEADER, MCP_SESSION_ID_HEADER};

/// Build a CORS layer for the configured origins.
///
/// - Methods: GET, POST, DELETE, OPTIONS
/// - Headers: Authorization, Content-Type, Accept, `mcp-session-id`, `mcp-protocol-version`
/// - Exposed: `mcp-session-id`, so browser clients can read the handshake result
/// - Credentials: allowed
/// - Max age: 3600s
pub fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(
                    event = "cors_origin_ignored",
                    origin = %origin,
                    "Ignoring CORS origin that is not a valid header value"
                );
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("authorization"),
            HeaderName::from_static("content-type"),
            HeaderName::from_static("accept"),
            HeaderName::from_static(MCP_SESSION_ID_HEADER),
            HeaderName::from_static(MCP_PROTOCOL_VERSION_HEADER),
        ])
        .expose_headers([HeaderName::from_static(MCP_SESSION_ID_HEADER)])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}
