//! Shared constants for end-to-end tests
//!
//! When test keys or timings change, update only this file.
#![allow(dead_code)]

// ============================================================================
// API Keys
// ============================================================================

/// Active key accepted by every test server
pub const VALID_API_KEY: &str = "dsk_0f4c1b9e-8a8d-4c1e-9a51-6f2f3f7c0a11";

/// Second active key, sharing no prefix with the first
pub const SECOND_API_KEY: &str = "team-b_7d2e5a40-3b6f-4b8e-a0a2-9c4d1e6f8b22";

/// Key configured with a revocation timestamp in the past
pub const REVOKED_API_KEY: &str = "dsk_9b1d2c3e-revoked-0000-000000000000";

/// Key configured with an expiry timestamp in the past
pub const EXPIRED_API_KEY: &str = "dsk_5e6f7a8b-expired-0000-000000000000";

/// Never configured anywhere
pub const UNKNOWN_API_KEY: &str = "dsk_00000000-0000-0000-0000-000000000000";

// ============================================================================
// Catalog
// ============================================================================

/// Component present in the built-in catalog
pub const KNOWN_COMPONENT: &str = "Button";

/// Number of tools every server registers, plus the slow test tool
pub const TOOL_COUNT: usize = 6;

/// Tool registered only by the test server; sleeps for `delay_ms`
pub const SLOW_TOOL: &str = "slow_echo";

// ============================================================================
// Timing
// ============================================================================

pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 10;
pub const REQUEST_TIMEOUT_SECS: u64 = 10;
