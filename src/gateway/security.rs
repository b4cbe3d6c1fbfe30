//! Security filter chain: header hardening, CORS and the payload size cap.

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use futures::StreamExt;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};

use super::context::{
    RequestContext, HEADER_RATE_LIMIT_LIMIT, HEADER_RATE_LIMIT_REMAINING, HEADER_RATE_LIMIT_RESET,
};
use super::error::GatewayError;
use super::pipeline::{GatewayStage, InboundBody, InboundRequest, StageOutcome};

/// Hard cap on request bodies.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const CORS_MAX_AGE_SECS: u64 = 600;

/// Protective headers set on every response.
pub const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    (
        "content-security-policy",
        "default-src 'none'; frame-ancestors 'none'",
    ),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
    ("x-dns-prefetch-control", "off"),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
];

/// Sets [`SECURITY_HEADERS`] on the response, whatever its outcome.
pub async fn harden_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers.insert(
            HeaderName::from_static(*name),
            HeaderValue::from_static(*value),
        );
    }
    response
}

/// CORS policy for the configured origins. `*` allows any origin; an empty
/// list emits no CORS headers at all. Preflights are answered by the layer
/// and never reach the pipeline.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed = origins
            .iter()
            .map(|o| {
                HeaderValue::from_str(o).with_context(|| format!("Invalid CORS origin: {}", o))
            })
            .collect::<Result<Vec<_>>>()?;
        AllowOrigin::list(parsed)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("x-api-key"),
            HeaderName::from_static("mcp-protocol-version"),
        ])
        .expose_headers([
            HeaderName::from_static(HEADER_RATE_LIMIT_LIMIT),
            HeaderName::from_static(HEADER_RATE_LIMIT_REMAINING),
            HeaderName::from_static(HEADER_RATE_LIMIT_RESET),
            header::RETRY_AFTER,
        ])
        .max_age(Duration::from_secs(CORS_MAX_AGE_SECS)))
}

/// Rejects oversized bodies before anything parses them, then buffers the
/// body for the stages that follow.
pub struct PayloadLimit {
    max_bytes: usize,
}

impl PayloadLimit {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl Default for PayloadLimit {
    fn default() -> Self {
        Self::new(MAX_BODY_BYTES)
    }
}

#[async_trait]
impl GatewayStage for PayloadLimit {
    fn name(&self) -> &'static str {
        "payload-limit"
    }

    async fn apply(&self, _ctx: &mut RequestContext, request: &mut InboundRequest) -> StageOutcome {
        let declared = request
            .parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if declared.is_some_and(|len| len > self.max_bytes as u64) {
            return StageOutcome::Halt(GatewayError::PayloadTooLarge {
                limit: self.max_bytes,
            });
        }

        let Some(body) = request.take_pending_body() else {
            return StageOutcome::Continue;
        };
        match read_capped(body, self.max_bytes).await {
            Ok(bytes) => {
                request.body = InboundBody::Buffered(bytes);
                StageOutcome::Continue
            }
            Err(err) => StageOutcome::Halt(err),
        }
    }
}

/// Buffers `body`, stopping as soon as it grows past `max_bytes`. A stream
/// that fails midway is the client's fault, not an oversized payload.
async fn read_capped(body: Body, max_bytes: usize) -> Result<Bytes, GatewayError> {
    let mut stream = body.into_data_stream();
    let mut buffer = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| GatewayError::Validation(format!("Failed to read request body: {}", e)))?;
        if buffer.len() + chunk.len() > max_bytes {
            return Err(GatewayError::PayloadTooLarge { limit: max_bytes });
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn inbound(body: Body, content_length: Option<usize>) -> InboundRequest {
        let mut builder = Request::builder().method("POST").uri("/mcp");
        if let Some(len) = content_length {
            builder = builder.header(header::CONTENT_LENGTH, len);
        }
        InboundRequest::from_request(builder.body(body).unwrap())
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Method::POST, "/mcp", "127.0.0.1")
    }

    #[tokio::test]
    async fn test_declared_length_over_limit_is_rejected_without_reading() {
        let limit = PayloadLimit::new(16);
        let mut request = inbound(Body::from("tiny"), Some(17));
        let outcome = limit.apply(&mut ctx(), &mut request).await;
        assert!(matches!(
            outcome,
            StageOutcome::Halt(GatewayError::PayloadTooLarge { limit: 16 })
        ));
        // body was never taken
        assert!(request.buffered_body().is_none());
    }

    #[tokio::test]
    async fn test_undeclared_length_over_limit_is_rejected() {
        let limit = PayloadLimit::new(16);
        let mut request = inbound(Body::from(vec![b'a'; 17]), None);
        let outcome = limit.apply(&mut ctx(), &mut request).await;
        assert!(matches!(
            outcome,
            StageOutcome::Halt(GatewayError::PayloadTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_body_at_limit_is_buffered() {
        let limit = PayloadLimit::new(16);
        let mut request = inbound(Body::from(vec![b'a'; 16]), Some(16));
        let outcome = limit.apply(&mut ctx(), &mut request).await;
        assert!(matches!(outcome, StageOutcome::Continue));
        assert_eq!(request.buffered_body().map(|b| b.len()), Some(16));
    }

    #[tokio::test]
    async fn test_chunked_body_over_limit_is_rejected() {
        let chunks = (0..3).map(|_| Ok::<_, std::io::Error>(Bytes::from(vec![b'a'; 10])));
        let limit = PayloadLimit::new(16);
        let mut request = inbound(Body::from_stream(futures::stream::iter(chunks)), None);
        let outcome = limit.apply(&mut ctx(), &mut request).await;
        assert!(matches!(
            outcome,
            StageOutcome::Halt(GatewayError::PayloadTooLarge { limit: 16 })
        ));
    }

    #[tokio::test]
    async fn test_aborted_body_is_a_validation_error() {
        let chunks = vec![
            Ok(Bytes::from_static(b"{\"jsonrpc\"")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "client went away")),
        ];
        let limit = PayloadLimit::new(1024);
        let mut request = inbound(Body::from_stream(futures::stream::iter(chunks)), None);
        let outcome = limit.apply(&mut ctx(), &mut request).await;
        match outcome {
            StageOutcome::Halt(GatewayError::Validation(message)) => {
                assert!(message.contains("Failed to read request body"))
            }
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hardening_headers_on_every_response() {
        let app = Router::new()
            .route("/ok", get(|| async { "ok" }))
            .layer(middleware::from_fn(harden_headers));

        for uri in ["/ok", "/missing"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            for (name, value) in SECURITY_HEADERS {
                assert_eq!(response.headers()[*name], *value, "{} on {}", name, uri);
            }
        }
    }

    #[tokio::test]
    async fn test_cors_preflight_for_allowed_origin() {
        let app = Router::new()
            .route("/mcp", get(|| async { "unreachable" }))
            .layer(cors_layer(&["https://tools.example.com".to_string()]).unwrap());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/mcp")
                    .header(header::ORIGIN, "https://tools.example.com")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://tools.example.com"
        );

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/mcp")
                    .header(header::ORIGIN, "https://evil.example.com")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }

    #[test]
    fn test_cors_rejects_invalid_origin() {
        assert!(cors_layer(&["bad\norigin".to_string()]).is_err());
        assert!(cors_layer(&["*".to_string()]).is_ok());
        assert!(cors_layer(&[]).is_ok());
    }
}
