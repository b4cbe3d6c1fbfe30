//! Per-request context shared by the gateway stages and the `/mcp` handler.

use axum::{
    extract::ConnectInfo,
    http::{request::Parts, HeaderMap, HeaderName, HeaderValue, Method},
};
use std::net::SocketAddr;
use uuid::Uuid;

pub const HEADER_RATE_LIMIT_LIMIT: &str = "ratelimit-limit";
pub const HEADER_RATE_LIMIT_REMAINING: &str = "ratelimit-remaining";
pub const HEADER_RATE_LIMIT_RESET: &str = "ratelimit-reset";

const HEADER_FORWARDED_FOR: &str = "x-forwarded-for";

/// Address used when the transport did not provide a peer address.
pub const UNKNOWN_CLIENT_ADDRESS: &str = "unknown";

/// Counter state reported back to the client on every limited route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    pub reset_after_secs: u64,
}

impl RateLimitStatus {
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(
            HeaderName::from_static(HEADER_RATE_LIMIT_LIMIT),
            HeaderValue::from(self.limit),
        );
        headers.insert(
            HeaderName::from_static(HEADER_RATE_LIMIT_REMAINING),
            HeaderValue::from(self.remaining),
        );
        headers.insert(
            HeaderName::from_static(HEADER_RATE_LIMIT_RESET),
            HeaderValue::from(self.reset_after_secs),
        );
    }
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub is_authenticated: bool,
    /// Leading slice of the presented API key, never the full key.
    pub api_key_prefix: Option<String>,
    pub client_address: String,
    pub method: Method,
    pub path: String,
    pub rate_limit: Option<RateLimitStatus>,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>, client_address: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            is_authenticated: false,
            api_key_prefix: None,
            client_address: client_address.into(),
            method,
            path: path.into(),
            rate_limit: None,
        }
    }

    pub fn from_parts(parts: &Parts, trust_proxy: bool) -> Self {
        Self::new(
            parts.method.clone(),
            parts.uri.path(),
            resolve_client_address(parts, trust_proxy),
        )
    }

    pub fn mark_authenticated(&mut self, api_key_prefix: String) {
        self.is_authenticated = true;
        self.api_key_prefix = Some(api_key_prefix);
    }

    /// Identifier safe to put in logs.
    pub fn client_label(&self) -> String {
        match &self.api_key_prefix {
            Some(prefix) => format!("key={}", prefix),
            None => format!("ip={}", self.client_address),
        }
    }
}

/// Peer address, or the first `X-Forwarded-For` hop when running behind a
/// trusted proxy.
fn resolve_client_address(parts: &Parts, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = parts
            .headers
            .get(HEADER_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(addr) = forwarded {
            return addr.to_string();
        }
    }

    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT_ADDRESS.to_string())
}
