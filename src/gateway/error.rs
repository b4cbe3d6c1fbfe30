//! Gateway error taxonomy
//!
//! Every stage that can fail produces a [`GatewayError`]. Its `IntoResponse`
//! impl is the error normalizer: the client always receives an
//! [`ErrorEnvelope`], and internal details stay in the server log.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::server::metrics::record_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ValidationError,
    AuthenticationError,
    /// Reserved for scope-based checks.
    AuthorizationError,
    RateLimitError,
    NotFound,
    BadRequest,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::AuthenticationError => "AUTHENTICATION_ERROR",
            ErrorKind::AuthorizationError => "AUTHORIZATION_ERROR",
            ErrorKind::RateLimitError => "RATE_LIMIT_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Body returned on every failure path.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub message: String,
    pub code: u16,
    #[serde(rename = "type")]
    pub kind: ErrorKind,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid request payload: {0}")]
    Validation(String),

    #[error("API key required")]
    MissingCredentials,

    #[error("Invalid API key")]
    InvalidCredentials,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limit exceeded: limit {limit} per {window_secs}s")]
    RateLimited {
        limit: u32,
        window_secs: u64,
        retry_after_secs: u64,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request body exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Validation(_) => ErrorKind::ValidationError,
            GatewayError::MissingCredentials | GatewayError::InvalidCredentials => {
                ErrorKind::AuthenticationError
            }
            GatewayError::Forbidden(_) => ErrorKind::AuthorizationError,
            GatewayError::RateLimited { .. } => ErrorKind::RateLimitError,
            GatewayError::NotFound(_) => ErrorKind::NotFound,
            GatewayError::PayloadTooLarge { .. } | GatewayError::Rejected(_) => {
                ErrorKind::BadRequest
            }
            GatewayError::Timeout | GatewayError::Internal(_) => ErrorKind::InternalError,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::MissingCredentials | GatewayError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Rejected(_) => StatusCode::BAD_REQUEST,
            GatewayError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the client.
    pub fn client_message(&self) -> String {
        match self {
            GatewayError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let status = self.status();
        ErrorEnvelope {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.client_message(),
            code: status.as_u16(),
            kind: self.kind(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if let GatewayError::Internal(detail) = &self {
            error!("Internal gateway error: {}", detail);
        }
        record_error(self.kind().as_str());

        let mut response = (self.status(), Json(self.envelope())).into_response();
        let headers = response.headers_mut();
        match &self {
            GatewayError::RateLimited {
                retry_after_secs, ..
            } => {
                headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
            }
            GatewayError::MissingCredentials | GatewayError::InvalidCredentials => {
                headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            _ => {}
        }
        response
    }
}
