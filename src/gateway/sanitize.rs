//! Input sanitization
//!
//! A pluggable [`InputSanitizer`] is applied to every JSON string value of the
//! body and to every query parameter value before routing sees them.

use async_trait::async_trait;
use axum::{
    body::Bytes,
    http::uri::{PathAndQuery, Uri},
};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::context::RequestContext;
use super::error::GatewayError;
use super::pipeline::{GatewayStage, InboundBody, InboundRequest, StageOutcome};

/// The cleaned JSON body, handed to the route through request extensions.
///
/// The body is never re-encoded: when cleaning changed something, the raw
/// bytes are dropped and routes must read this value instead.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedJson(pub Value);

/// Why a value could not be made safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizeRejection(pub String);

pub trait InputSanitizer: Send + Sync {
    /// Returns the cleaned value, or a rejection when the value cannot be
    /// cleaned.
    fn sanitize(&self, value: &str) -> Result<String, SanitizeRejection>;
}

lazy_static! {
    static ref SCRIPT_BLOCK: Regex = Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").unwrap();
    static ref EMBED_TAG: Regex =
        Regex::new(r"(?i)</?\s*(script|iframe|object|embed)\b[^>]*>").unwrap();
    static ref JAVASCRIPT_URI: Regex = Regex::new(r"(?i)javascript\s*:").unwrap();
    static ref EVENT_HANDLER: Regex = Regex::new(r#"(?i)\bon[a-z]+\s*=\s*("[^"]*"|'[^']*'|[^\s>]*)"#).unwrap();
}

/// Strips markup that would execute if echoed into a page, and rejects NUL
/// bytes outright.
#[derive(Debug, Default, Clone)]
pub struct DefaultSanitizer;

impl DefaultSanitizer {
    pub fn new() -> Self {
        Self
    }
}

impl InputSanitizer for DefaultSanitizer {
    fn sanitize(&self, value: &str) -> Result<String, SanitizeRejection> {
        if value.contains('\0') {
            return Err(SanitizeRejection("NUL byte in input".to_string()));
        }
        let cleaned = SCRIPT_BLOCK.replace_all(value, "");
        let cleaned = EMBED_TAG.replace_all(&cleaned, "");
        let cleaned = JAVASCRIPT_URI.replace_all(&cleaned, "");
        let cleaned = EVENT_HANDLER.replace_all(&cleaned, "");
        Ok(cleaned.into_owned())
    }
}

pub struct SanitizeStage {
    sanitizer: Arc<dyn InputSanitizer>,
}

impl SanitizeStage {
    pub fn new(sanitizer: Arc<dyn InputSanitizer>) -> Self {
        Self { sanitizer }
    }

    fn sanitize_value(&self, value: Value) -> Result<Value, SanitizeRejection> {
        Ok(match value {
            Value::String(s) => Value::String(self.sanitizer.sanitize(&s)?),
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|v| self.sanitize_value(v))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(fields) => {
                let mut cleaned = Map::with_capacity(fields.len());
                for (key, v) in fields {
                    // operator-style keys never belong in a protocol payload
                    if key.starts_with('$') {
                        continue;
                    }
                    cleaned.insert(key, self.sanitize_value(v)?);
                }
                Value::Object(cleaned)
            }
            other => other,
        })
    }

    /// Parses and cleans a JSON body. Bodies that are not JSON yield `None`
    /// and pass through untouched; the route reports them as validation
    /// errors. The flag tells whether anything was changed.
    fn sanitize_body(&self, bytes: &Bytes) -> Result<Option<(Value, bool)>, SanitizeRejection> {
        if bytes.is_empty() {
            return Ok(None);
        }
        let Ok(original) = serde_json::from_slice::<Value>(bytes) else {
            return Ok(None);
        };
        let cleaned = self.sanitize_value(original.clone())?;
        let changed = cleaned != original;
        Ok(Some((cleaned, changed)))
    }

    fn sanitize_query(&self, query: &str) -> Result<String, SanitizeRejection> {
        let mut pairs = Vec::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let decoded = urlencoding::decode(&value.replace('+', " "))
                .map_err(|e| SanitizeRejection(format!("Malformed query string: {}", e)))?
                .into_owned();
            let cleaned = self.sanitizer.sanitize(&decoded)?;
            pairs.push(format!("{}={}", key, urlencoding::encode(&cleaned)));
        }
        Ok(pairs.join("&"))
    }

    fn rewrite_query(&self, uri: &Uri) -> Result<Option<Uri>, SanitizeRejection> {
        let Some(query) = uri.query() else {
            return Ok(None);
        };
        let cleaned = self.sanitize_query(query)?;
        if cleaned == query {
            return Ok(None);
        }
        let path_and_query = if cleaned.is_empty() {
            uri.path().to_string()
        } else {
            format!("{}?{}", uri.path(), cleaned)
        };
        let mut parts = uri.clone().into_parts();
        parts.path_and_query = Some(
            PathAndQuery::try_from(path_and_query)
                .map_err(|e| SanitizeRejection(e.to_string()))?,
        );
        Uri::from_parts(parts)
            .map(Some)
            .map_err(|e| SanitizeRejection(e.to_string()))
    }
}

#[async_trait]
impl GatewayStage for SanitizeStage {
    fn name(&self) -> &'static str {
        "sanitize"
    }

    async fn apply(&self, ctx: &mut RequestContext, request: &mut InboundRequest) -> StageOutcome {
        match self.rewrite_query(&request.parts.uri) {
            Ok(Some(uri)) => {
                debug!("[{}] query string sanitized", ctx.request_id);
                request.parts.uri = uri;
            }
            Ok(None) => {}
            Err(SanitizeRejection(reason)) => {
                return StageOutcome::Halt(GatewayError::Rejected(reason));
            }
        }

        let Some(bytes) = request.buffered_body() else {
            return StageOutcome::Continue;
        };
        match self.sanitize_body(bytes) {
            Ok(Some((cleaned, changed))) => {
                if changed {
                    debug!("[{}] request body sanitized", ctx.request_id);
                    request.body = InboundBody::Buffered(Bytes::new());
                }
                request.parts.extensions.insert(SanitizedJson(cleaned));
                StageOutcome::Continue
            }
            Ok(None) => StageOutcome::Continue,
            Err(SanitizeRejection(reason)) => StageOutcome::Halt(GatewayError::Rejected(reason)),
        }
    }
}
