//! Gateway Pipeline
//!
//! Everything that stands between an HTTP client and the `/mcp` endpoint.
//!
//! ## Order
//!
//! 1. Header hardening and CORS: outermost tower layers, see [`security`]
//! 2. Payload size limit: [`security::PayloadLimit`]
//! 3. Input sanitization: [`sanitize::SanitizeStage`]
//! 4. Authentication: [`auth::AuthGuard`]
//! 5. Tiered rate limiting: [`rate_limit::RateLimitStage`]
//!
//! Stages 2-5 are [`GatewayStage`]s composed by a [`GatewayPipeline`]; each one
//! either lets the request through or halts it with a [`GatewayError`], which
//! the error normalizer turns into an [`ErrorEnvelope`].

pub mod auth;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod rate_limit;
pub mod sanitize;
pub mod security;

pub use auth::{AuthGuard, AuthRequirement};
pub use context::{RateLimitStatus, RequestContext};
pub use error::{ErrorEnvelope, ErrorKind, GatewayError};
pub use pipeline::{gateway_layer, GatewayPipeline, GatewayStage, InboundRequest, StageOutcome};
pub use rate_limit::{InMemoryRateLimitStore, RateLimitStage, RateLimitStore, RatePolicy, TieredRateLimiter};
pub use sanitize::{DefaultSanitizer, InputSanitizer, SanitizeStage, SanitizedJson};
pub use security::{cors_layer, harden_headers, PayloadLimit, MAX_BODY_BYTES};
