use axum::extract::FromRef;

use crate::credentials::CredentialStore;
use crate::gateway::{
    AuthGuard, AuthRequirement, DefaultSanitizer, GatewayPipeline, PayloadLimit, RateLimitStage,
    SanitizeStage, TieredRateLimiter,
};
use crate::mcp::McpServer;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedMcpServer = Arc<McpServer>;
pub type GuardedCredentialStore = Arc<CredentialStore>;
pub type GuardedRateLimiter = Arc<TieredRateLimiter>;
pub type GuardedPipeline = Arc<GatewayPipeline>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub mcp: GuardedMcpServer,
    pub credentials: GuardedCredentialStore,
    pub rate_limiter: GuardedRateLimiter,
    pub pipeline: GuardedPipeline,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        mcp: GuardedMcpServer,
        credentials: GuardedCredentialStore,
        rate_limiter: GuardedRateLimiter,
    ) -> Self {
        let pipeline = Arc::new(build_pipeline(
            &config,
            credentials.clone(),
            rate_limiter.clone(),
        ));
        Self {
            config,
            start_time: Instant::now(),
            mcp,
            credentials,
            rate_limiter,
            pipeline,
        }
    }
}

/// Payload limit, sanitizer, auth and rate limiting, in that order.
pub fn build_pipeline(
    config: &ServerConfig,
    credentials: GuardedCredentialStore,
    rate_limiter: GuardedRateLimiter,
) -> GatewayPipeline {
    let requirement = if config.allow_anonymous_mcp {
        AuthRequirement::Optional
    } else {
        AuthRequirement::Required
    };
    GatewayPipeline::new(config.trust_proxy)
        .with_stage(PayloadLimit::default())
        .with_stage(SanitizeStage::new(Arc::new(DefaultSanitizer::new())))
        .with_stage(AuthGuard::new(credentials, requirement))
        .with_stage(RateLimitStage::new(rate_limiter))
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for GuardedMcpServer {
    fn from_ref(input: &ServerState) -> Self {
        input.mcp.clone()
    }
}

impl FromRef<ServerState> for GuardedPipeline {
    fn from_ref(input: &ServerState) -> Self {
        input.pipeline.clone()
    }
}
