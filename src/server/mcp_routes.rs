//! Stateless MCP endpoint.
//!
//! Every `POST /mcp` opens a fresh session, answers, and drops it. There is
//! no server-initiated stream and no session to delete, so `GET` and
//! `DELETE` only report that.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::post,
    Extension, Json, Router,
};
use serde_json::Value;
use tracing::debug;

use super::state::{GuardedMcpServer, ServerState};
use super::ServerConfig;
use crate::gateway::{gateway_layer, GatewayError, RequestContext, SanitizedJson};
use crate::mcp::{McpError, McpResponse, SessionMode};

pub const MCP_PATH: &str = "/mcp";

async fn post_mcp(
    State(mcp): State<GuardedMcpServer>,
    State(config): State<ServerConfig>,
    ctx: Option<Extension<RequestContext>>,
    sanitized: Option<Extension<SanitizedJson>>,
    body: Bytes,
) -> Response {
    let request_id = ctx
        .as_ref()
        .map(|Extension(ctx)| ctx.request_id.clone())
        .unwrap_or_default();

    let message: Value = match sanitized {
        Some(Extension(SanitizedJson(value))) => value,
        None => match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(e) => {
                return GatewayError::Validation(format!("Body is not valid JSON: {}", e))
                    .into_response()
            }
        },
    };

    let mut session = mcp.open_session(SessionMode::Stateless);
    let outcome = tokio::time::timeout(config.request_timeout, session.handle_value(message)).await;

    match outcome {
        Ok(Some(payload)) => Json(payload).into_response(),
        Ok(None) => {
            debug!("[{}] notifications accepted", request_id);
            StatusCode::ACCEPTED.into_response()
        }
        Err(_) => {
            debug!(
                "[{}] MCP request exceeded {}ms",
                request_id,
                config.request_timeout.as_millis()
            );
            GatewayError::Timeout.into_response()
        }
    }
}

async fn method_not_allowed() -> Response {
    let body = McpResponse::error(
        None,
        McpError::ServerError(
            "Method not allowed: this endpoint is stateless, use POST".to_string(),
        ),
    );
    let mut response = (StatusCode::METHOD_NOT_ALLOWED, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static("POST"));
    response
}

/// `/mcp` behind the gateway pipeline.
pub fn make_mcp_routes(state: ServerState) -> Router {
    Router::new()
        .route(
            MCP_PATH,
            post(post_mcp)
                .get(method_not_allowed)
                .delete(method_not_allowed),
        )
        .route_layer(middleware::from_fn_with_state(
            state.pipeline.clone(),
            gateway_layer,
        ))
        // the pipeline's payload limit is the only body cap
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}
