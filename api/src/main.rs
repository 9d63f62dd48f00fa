use std::sync::Arc;

use axum::Router;
use clap::Parser;
use evalgate_core::error::codes;
use evalgate_core::upstream::UpstreamConfigStatus;
use evalgate_mcp_runtime::{ConfigurationFault, HttpUpstreamClient, SessionReaper};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod error;
mod middleware;
mod routes;
mod state;
#[cfg(test)]
mod test_support;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "evalgate",
        version = "0.1.0",
        description = "MCP gateway exposing the events API as read-only tools. The MCP endpoint itself is JSON-RPC at /mcp."
    ),
    paths(routes::health::health_check),
    components(schemas(HealthResponse, UpstreamConfigStatus))
)]
struct ApiDoc;

#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub upstream: UpstreamConfigStatus,
    pub active_sessions: usize,
}

pub(crate) fn build_app(app_state: state::AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::mcp_http::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::cors::build_cors_layer(cors_origins)),
        )
        .with_state(app_state)
}

fn build_state(cli: &config::Cli) -> Result<(state::AppState, SessionReaper), ConfigurationFault> {
    let upstream_config = cli.upstream_config()?;
    tracing::info!(
        event = "upstream_configured",
        base_url = %upstream_config.base_url(),
        credential_fingerprint = %upstream_config.credential_fingerprint(),
        timeout_secs = cli.upstream_timeout_secs,
        "Upstream events API configured"
    );
    let upstream = HttpUpstreamClient::new(upstream_config)?;
    let idle_ttl = cli.session_idle_ttl();
    tracing::info!(
        event = "session_store_configured",
        idle_ttl_secs = idle_ttl.as_secs(),
        "Idle MCP sessions expire after {}s",
        idle_ttl.as_secs()
    );
    Ok(state::AppState::new(Arc::new(upstream), idle_ttl))
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "evalgate_api=info,evalgate_mcp_runtime=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cli = config::Cli::parse();

    let (app_state, reaper) = match build_state(&cli) {
        Ok(parts) => parts,
        Err(fault) => {
            tracing::error!(
                event = "configuration_fault",
                code = codes::CONFIGURATION_FAULT,
                error = %fault,
                "Refusing to start with incomplete upstream configuration"
            );
            std::process::exit(1);
        }
    };
    tokio::spawn(reaper.run());

    let app = build_app(app_state.clone(), &cli.cors_origins());

    let addr = cli.bind_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(event = "bind_failed", %addr, error = %e, "Failed to bind listener");
            std::process::exit(1);
        }
    };
    tracing::info!(event = "server_listening", %addr, "evalgate listening on {}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(event = "server_error", error = %e, "HTTP server terminated with error");
    }

    let closed = app_state.store().close_all().await;
    tracing::info!(
        event = "server_stopped",
        closed_sessions = closed,
        "evalgate stopped"
    );
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(event = "signal_handler_failed", signal = "SIGINT", error = %e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(event = "signal_handler_failed", signal = "SIGTERM", error = %e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!(event = "shutdown_requested", "Shutdown signal received; draining");
}
