//! Tiered Rate Limiting
//!
//! Fixed-window request counting with one policy for anonymous callers (keyed
//! by client address) and one for authenticated callers (keyed by API key
//! prefix). A request is counted against exactly one of the two policies.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, warn};

use super::context::{RateLimitStatus, RequestContext};
use super::error::GatewayError;
use super::pipeline::{GatewayStage, InboundRequest, StageOutcome};
use crate::server::metrics;

pub const DEFAULT_WINDOW_MS: u64 = 60_000;
pub const ANONYMOUS_MAX_REQUESTS: u32 = 100;
pub const AUTHENTICATED_MAX_REQUESTS: u32 = 500;
pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

/// One fixed-window policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub window_ms: u64,
    pub max_requests: u32,
}

impl RatePolicy {
    pub fn new(window_ms: u64, max_requests: u32) -> Self {
        Self {
            window_ms,
            max_requests,
        }
    }

    pub fn anonymous() -> Self {
        Self::new(DEFAULT_WINDOW_MS, ANONYMOUS_MAX_REQUESTS)
    }

    pub fn authenticated() -> Self {
        Self::new(DEFAULT_WINDOW_MS, AUTHENTICATED_MAX_REQUESTS)
    }

    pub fn window_secs(&self) -> u64 {
        self.window_ms / 1000
    }

    fn window_index(&self, now_ms: u64) -> u64 {
        now_ms / self.window_ms.max(1)
    }

    /// Whole seconds until the window containing `now_ms` ends, rounded up.
    fn reset_after_secs(&self, now_ms: u64) -> u64 {
        let window_ms = self.window_ms.max(1);
        let window_end = (self.window_index(now_ms) + 1) * window_ms;
        (window_end - now_ms).div_ceil(1000)
    }
}

/// Ledger key. The two namespaces never collide, so an address can never eat
/// into a key's budget or the other way around.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateLimitKey {
    Address(String),
    ApiKeyPrefix(String),
}

impl RateLimitKey {
    pub fn for_context(ctx: &RequestContext) -> Self {
        match (&ctx.api_key_prefix, ctx.is_authenticated) {
            (Some(prefix), true) => RateLimitKey::ApiKeyPrefix(prefix.clone()),
            _ => RateLimitKey::Address(ctx.client_address.clone()),
        }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitKey::Address(addr) => write!(f, "ip:{}", addr),
            RateLimitKey::ApiKeyPrefix(prefix) => write!(f, "key:{}", prefix),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed(RateLimitStatus),
    Denied(RateLimitStatus),
}

impl RateDecision {
    pub fn status(&self) -> RateLimitStatus {
        match self {
            RateDecision::Allowed(status) | RateDecision::Denied(status) => *status,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed(_))
    }
}

/// Storage for window counters. The check and the increment must happen
/// atomically per key.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn check_and_increment(
        &self,
        key: &RateLimitKey,
        policy: &RatePolicy,
        now_ms: u64,
    ) -> Result<RateDecision>;

    /// Drops counters whose window has passed. Returns how many were removed.
    async fn sweep(&self, _now_ms: u64) -> usize {
        0
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    window_index: u64,
    window_ms: u64,
    count: u32,
}

/// Process-local ledger.
pub struct InMemoryRateLimitStore {
    counters: Mutex<HashMap<RateLimitKey, WindowCounter>>,
    max_entries: usize,
}

impl InMemoryRateLimitStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            max_entries,
        }
    }

    /// Current count for a key (for debugging/metrics)
    pub fn usage(&self, key: &RateLimitKey) -> Option<u32> {
        let counters = self.counters.lock().ok()?;
        counters.get(key).map(|c| c.count)
    }

    pub fn len(&self) -> usize {
        self.counters.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn retain_current(counters: &mut HashMap<RateLimitKey, WindowCounter>, now_ms: u64) -> usize {
        let before = counters.len();
        counters.retain(|_, c| c.window_index == now_ms / c.window_ms.max(1));
        before - counters.len()
    }
}

impl Default for InMemoryRateLimitStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn check_and_increment(
        &self,
        key: &RateLimitKey,
        policy: &RatePolicy,
        now_ms: u64,
    ) -> Result<RateDecision> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| anyhow!("Rate limit ledger lock poisoned"))?;

        let window_index = policy.window_index(now_ms);
        let reset_after_secs = policy.reset_after_secs(now_ms);

        if !counters.contains_key(key) && counters.len() >= self.max_entries {
            let swept = Self::retain_current(&mut counters, now_ms);
            if counters.len() >= self.max_entries {
                warn!(
                    "Rate limit ledger full ({} entries), denying new key {}",
                    counters.len(),
                    key
                );
                return Ok(RateDecision::Denied(RateLimitStatus {
                    limit: policy.max_requests,
                    remaining: 0,
                    reset_after_secs,
                }));
            }
            debug!("Rate limit ledger full, swept {} stale entries", swept);
        }

        let counter = counters.entry(key.clone()).or_insert(WindowCounter {
            window_index,
            window_ms: policy.window_ms,
            count: 0,
        });
        if counter.window_index != window_index {
            counter.window_index = window_index;
            counter.window_ms = policy.window_ms;
            counter.count = 0;
        }
        counter.count = counter.count.saturating_add(1);

        let status = RateLimitStatus {
            limit: policy.max_requests,
            remaining: policy.max_requests.saturating_sub(counter.count),
            reset_after_secs,
        };
        if counter.count > policy.max_requests {
            Ok(RateDecision::Denied(status))
        } else {
            Ok(RateDecision::Allowed(status))
        }
    }

    async fn sweep(&self, now_ms: u64) -> usize {
        match self.counters.lock() {
            Ok(mut counters) => Self::retain_current(&mut counters, now_ms),
            Err(_) => 0,
        }
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Dispatches each request to the policy of its tier.
pub struct TieredRateLimiter {
    anonymous: RatePolicy,
    authenticated: RatePolicy,
    store: Arc<dyn RateLimitStore>,
}

impl TieredRateLimiter {
    pub fn new(
        anonymous: RatePolicy,
        authenticated: RatePolicy,
        store: Arc<dyn RateLimitStore>,
    ) -> Self {
        Self {
            anonymous,
            authenticated,
            store,
        }
    }

    pub fn policy_for(&self, ctx: &RequestContext) -> &RatePolicy {
        if ctx.is_authenticated {
            &self.authenticated
        } else {
            &self.anonymous
        }
    }

    pub fn anonymous_policy(&self) -> &RatePolicy {
        &self.anonymous
    }

    pub fn authenticated_policy(&self) -> &RatePolicy {
        &self.authenticated
    }

    pub fn store(&self) -> &Arc<dyn RateLimitStore> {
        &self.store
    }

    pub async fn check(&self, ctx: &RequestContext) -> Result<RateDecision> {
        self.check_at(ctx, now_millis()).await
    }

    pub async fn check_at(&self, ctx: &RequestContext, now_ms: u64) -> Result<RateDecision> {
        let key = RateLimitKey::for_context(ctx);
        self.store
            .check_and_increment(&key, self.policy_for(ctx), now_ms)
            .await
    }
}

impl Default for TieredRateLimiter {
    fn default() -> Self {
        Self::new(
            RatePolicy::anonymous(),
            RatePolicy::authenticated(),
            Arc::new(InMemoryRateLimitStore::default()),
        )
    }
}

pub struct RateLimitStage {
    limiter: Arc<TieredRateLimiter>,
}

impl RateLimitStage {
    pub fn new(limiter: Arc<TieredRateLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl GatewayStage for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate-limit"
    }

    async fn apply(&self, ctx: &mut RequestContext, _request: &mut InboundRequest) -> StageOutcome {
        let decision = match self.limiter.check(ctx).await {
            Ok(decision) => decision,
            Err(err) => {
                error!("[{}] rate limit store failed: {:#}", ctx.request_id, err);
                return StageOutcome::Halt(GatewayError::Internal(err.to_string()));
            }
        };

        let status = decision.status();
        ctx.rate_limit = Some(status);
        if decision.is_allowed() {
            return StageOutcome::Continue;
        }

        let tier = if ctx.is_authenticated {
            "authenticated"
        } else {
            "anonymous"
        };
        metrics::record_rate_limit_hit(tier);
        let policy = self.limiter.policy_for(ctx);
        StageOutcome::Halt(GatewayError::RateLimited {
            limit: policy.max_requests,
            window_secs: policy.window_secs(),
            retry_after_secs: status.reset_after_secs.max(1),
        })
    }
}
