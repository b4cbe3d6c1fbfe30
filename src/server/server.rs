use anyhow::{Context, Result};
use std::any::Any;
use std::net::SocketAddr;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use axum::{
    extract::State,
    http::{StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;

use super::mcp_routes::{make_mcp_routes, MCP_PATH};
use super::{log_requests, state::*};
use crate::gateway::{cors_layer, harden_headers, GatewayError, MAX_BODY_BYTES};
use crate::mcp::protocol::SUPPORTED_PROTOCOL_VERSIONS;
use crate::mcp::{McpError, McpResponse};

#[derive(Serialize)]
struct HealthStatus {
    pub status: &'static str,
    pub uptime: String,
    pub uptime_secs: u64,
    pub version: String,
    pub environment: String,
    pub transport: &'static str,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed();
    Json(HealthStatus {
        status: "ok",
        uptime: format_uptime(uptime),
        uptime_secs: uptime.as_secs(),
        version: state.mcp.version().to_string(),
        environment: state.config.environment.clone(),
        transport: "http",
    })
}

async fn api_docs(State(state): State<ServerState>) -> impl IntoResponse {
    let registry = state.mcp.registry();
    let rate_limit = &state.config.rate_limit;

    Json(json!({
        "name": crate::mcp::handler::SERVER_NAME,
        "version": state.mcp.version(),
        "endpoint": MCP_PATH,
        "protocolVersions": SUPPORTED_PROTOCOL_VERSIONS,
        "authentication": {
            "schemes": ["Authorization: Bearer <api-key>", "X-API-Key: <api-key>"],
            "anonymousAccess": state.config.allow_anonymous_mcp,
        },
        "rateLimits": {
            "windowSecs": rate_limit.anonymous_policy().window_secs(),
            "anonymous": {
                "maxRequests": rate_limit.anonymous_max,
                "keyedBy": "client address",
            },
            "authenticated": {
                "maxRequests": rate_limit.authenticated_max,
                "keyedBy": "api key prefix",
            },
        },
        "maxBodyBytes": MAX_BODY_BYTES,
        "tools": registry.tool_definitions(),
        "resources": registry.resource_definitions(),
        "resourceTemplates": registry.resource_template_definitions(),
    }))
}

async fn not_found(uri: Uri) -> Response {
    GatewayError::NotFound(uri.path().to_string()).into_response()
}

/// Panics become a JSON-RPC internal error; the payload stays in the logs.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    error!("Request handler panicked: {}", detail);
    crate::server::metrics::record_error("PANIC");

    let body = McpResponse::error(None, McpError::InternalError(detail));
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

pub fn make_app(state: ServerState) -> Result<Router> {
    let cors = cors_layer(&state.config.cors_origins)?;

    let open_routes: Router = Router::new()
        .route("/health", get(health))
        .route("/api/docs", get(api_docs))
        .with_state(state.clone());

    let app: Router = open_routes
        .merge(make_mcp_routes(state.clone()))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state, log_requests))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors)
        .layer(middleware::from_fn(harden_headers));

    Ok(app)
}

pub async fn run_server(state: ServerState, shutdown: CancellationToken) -> Result<()> {
    let addr = SocketAddr::new(state.config.bind_address, state.config.port);
    let app = make_app(state)?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", addr))?;
    info!("MCP gateway listening on http://{}", addr);

    serve(listener, app, shutdown).await
}

/// Serves until `shutdown` fires, then waits for in-flight requests.
pub async fn serve(
    listener: tokio::net::TcpListener,
    app: Router,
    shutdown: CancellationToken,
) -> Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.cancelled_owned())
    .await
    .context("HTTP server failed")
}
