use async_trait::async_trait;
use axum::http::{header, request::Parts};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use super::context::RequestContext;
use super::error::GatewayError;
use super::pipeline::{GatewayStage, InboundRequest, StageOutcome};
use crate::credentials::{key_prefix, CredentialCheck, CredentialStore};
use crate::server::metrics;

pub const HEADER_API_KEY: &str = "x-api-key";
const BEARER_SCHEME: &str = "bearer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequirement {
    /// No credentials means 401.
    Required,
    /// No credentials means anonymous.
    Optional,
}

/// What the request carried in its auth headers.
#[derive(Debug, PartialEq, Eq)]
enum PresentedToken {
    Absent,
    Token(String),
    Malformed,
}

fn extract_token_from_authorization(parts: &Parts) -> PresentedToken {
    let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
        return PresentedToken::Absent;
    };
    let Ok(value) = value.to_str() else {
        return PresentedToken::Malformed;
    };
    match value.trim().split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case(BEARER_SCHEME) => {
            let token = token.trim();
            if token.is_empty() {
                PresentedToken::Malformed
            } else {
                PresentedToken::Token(token.to_string())
            }
        }
        _ => PresentedToken::Malformed,
    }
}

fn extract_token_from_api_key_header(parts: &Parts) -> PresentedToken {
    match parts.headers.get(HEADER_API_KEY).map(|v| v.to_str()) {
        None => PresentedToken::Absent,
        Some(Ok(v)) if !v.trim().is_empty() => PresentedToken::Token(v.trim().to_string()),
        Some(_) => PresentedToken::Malformed,
    }
}

fn extract_token(parts: &Parts) -> PresentedToken {
    match extract_token_from_authorization(parts) {
        PresentedToken::Absent => extract_token_from_api_key_header(parts),
        other => other,
    }
}

/// Classifies the request as authenticated or anonymous.
pub struct AuthGuard {
    credentials: Arc<CredentialStore>,
    requirement: AuthRequirement,
}

impl AuthGuard {
    pub fn new(credentials: Arc<CredentialStore>, requirement: AuthRequirement) -> Self {
        Self {
            credentials,
            requirement,
        }
    }

    pub fn requirement(&self) -> AuthRequirement {
        self.requirement
    }
}

#[async_trait]
impl GatewayStage for AuthGuard {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn apply(&self, ctx: &mut RequestContext, request: &mut InboundRequest) -> StageOutcome {
        let token = match extract_token(&request.parts) {
            PresentedToken::Absent => {
                return match self.requirement {
                    AuthRequirement::Optional => {
                        debug!("[{}] anonymous request", ctx.request_id);
                        StageOutcome::Continue
                    }
                    AuthRequirement::Required => {
                        metrics::record_auth_failure("missing");
                        StageOutcome::Halt(GatewayError::MissingCredentials)
                    }
                };
            }
            PresentedToken::Malformed => {
                metrics::record_auth_failure("malformed");
                return StageOutcome::Halt(GatewayError::InvalidCredentials);
            }
            PresentedToken::Token(token) => token,
        };

        match self.credentials.check(&token, Utc::now()) {
            CredentialCheck::Valid(record) => {
                ctx.mark_authenticated(record.prefix());
                debug!(
                    "[{}] authenticated {}",
                    ctx.request_id,
                    ctx.client_label()
                );
                StageOutcome::Continue
            }
            rejected => {
                let reason = match rejected {
                    CredentialCheck::Expired => "expired",
                    CredentialCheck::Revoked => "revoked",
                    _ => "unknown",
                };
                debug!(
                    "[{}] rejected {} key with prefix {}",
                    ctx.request_id,
                    reason,
                    key_prefix(&token)
                );
                metrics::record_auth_failure(reason);
                StageOutcome::Halt(GatewayError::InvalidCredentials)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::ApiKeyRecord;
    use axum::{
        body::Body,
        http::{Method, Request},
    };
    use chrono::Duration;

    const KEY: &str = "dsk_0f8e1c6a-8a53-4bd1-9e0b-5c2f7d1a9b44";

    fn guard(requirement: AuthRequirement) -> AuthGuard {
        let store = CredentialStore::new([
            ApiKeyRecord::new(KEY),
            ApiKeyRecord {
                revoked_at: Some(Utc::now() - Duration::hours(1)),
                ..ApiKeyRecord::new("dsk_revoked")
            },
        ]);
        AuthGuard::new(Arc::new(store), requirement)
    }

    fn request(headers: &[(&str, &str)]) -> InboundRequest {
        let mut builder = Request::builder().method("POST").uri("/mcp");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        InboundRequest::from_request(builder.body(Body::empty()).unwrap())
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Method::POST, "/mcp", "127.0.0.1")
    }

    #[tokio::test]
    async fn test_valid_bearer_token() {
        let mut ctx = ctx();
        let auth = format!("Bearer {}", KEY);
        let outcome = guard(AuthRequirement::Required)
            .apply(&mut ctx, &mut request(&[("authorization", &auth)]))
            .await;
        assert!(matches!(outcome, StageOutcome::Continue));
        assert!(ctx.is_authenticated);
        assert_eq!(ctx.api_key_prefix.as_deref(), Some("dsk_0f8e1c6a"));
    }

    #[tokio::test]
    async fn test_bearer_scheme_is_case_insensitive() {
        let mut ctx = ctx();
        let auth = format!("bEaReR {}", KEY);
        let outcome = guard(AuthRequirement::Required)
            .apply(&mut ctx, &mut request(&[("authorization", &auth)]))
            .await;
        assert!(matches!(outcome, StageOutcome::Continue));
    }

    #[tokio::test]
    async fn test_api_key_header_fallback() {
        let mut ctx = ctx();
        let outcome = guard(AuthRequirement::Required)
            .apply(&mut ctx, &mut request(&[(HEADER_API_KEY, KEY)]))
            .await;
        assert!(matches!(outcome, StageOutcome::Continue));
        assert!(ctx.is_authenticated);
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let mut ctx = ctx();
        let outcome = guard(AuthRequirement::Required)
            .apply(&mut ctx, &mut request(&[]))
            .await;
        assert!(matches!(
            outcome,
            StageOutcome::Halt(GatewayError::MissingCredentials)
        ));

        let mut ctx = RequestContext::new(Method::POST, "/mcp", "127.0.0.1");
        let outcome = guard(AuthRequirement::Optional)
            .apply(&mut ctx, &mut request(&[]))
            .await;
        assert!(matches!(outcome, StageOutcome::Continue));
        assert!(!ctx.is_authenticated);
        assert!(ctx.api_key_prefix.is_none());
    }

    #[tokio::test]
    async fn test_invalid_token_rejected_on_optional_routes() {
        for requirement in [AuthRequirement::Required, AuthRequirement::Optional] {
            let mut ctx = ctx();
            let outcome = guard(requirement)
                .apply(&mut ctx, &mut request(&[("authorization", "Bearer nope")]))
                .await;
            assert!(matches!(
                outcome,
                StageOutcome::Halt(GatewayError::InvalidCredentials)
            ));
            assert!(!ctx.is_authenticated);
        }
    }

    #[tokio::test]
    async fn test_revoked_key_is_rejected() {
        let mut ctx = ctx();
        let outcome = guard(AuthRequirement::Required)
            .apply(
                &mut ctx,
                &mut request(&[("authorization", "Bearer dsk_revoked")]),
            )
            .await;
        assert!(matches!(
            outcome,
            StageOutcome::Halt(GatewayError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_token_extraction() {
        let parts = |headers: &[(&str, &str)]| request(headers).parts;
        assert_eq!(extract_token(&parts(&[])), PresentedToken::Absent);
        assert_eq!(
            extract_token(&parts(&[("authorization", "Basic dXNlcjpwYXNz")])),
            PresentedToken::Malformed
        );
        assert_eq!(
            extract_token(&parts(&[("authorization", "Bearer   ")])),
            PresentedToken::Malformed
        );
        // Authorization wins over the fallback header
        assert_eq!(
            extract_token(&parts(&[
                ("authorization", "Bearer first"),
                (HEADER_API_KEY, "second")
            ])),
            PresentedToken::Token("first".to_string())
        );
    }
}
