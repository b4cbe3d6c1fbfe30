use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::credentials::ApiKeyRecord;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub transport: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub environment: Option<String>,
    pub catalog_path: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub shutdown_grace_secs: Option<u64>,

    // Gateway
    pub allow_anonymous_mcp: Option<bool>,
    pub trust_proxy: Option<bool>,
    pub cors_origins: Option<Vec<String>>,
    pub rate_limit: Option<RateLimitConfig>,

    /// Keys with optional label, expiry and revocation timestamps.
    pub api_keys: Vec<ApiKeyRecord>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    pub window_ms: Option<u64>,
    pub anonymous_max: Option<u32>,
    pub authenticated_max: Option<u32>,
    pub max_entries: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
