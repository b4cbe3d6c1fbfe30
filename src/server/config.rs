use super::RequestsLoggingLevel;
use crate::config::RateLimitSettings;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub bind_address: IpAddr,
    pub port: u16,
    pub metrics_port: Option<u16>,
    /// Reported by `/health`.
    pub environment: String,
    pub request_timeout: Duration,
    /// If true, `/mcp` accepts requests without credentials under the
    /// anonymous rate limit tier.
    pub allow_anonymous_mcp: bool,
    pub trust_proxy: bool,
    pub cors_origins: Vec<String>,
    pub rate_limit: RateLimitSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3000,
            metrics_port: None,
            environment: "development".to_string(),
            request_timeout: Duration::from_millis(5000),
            allow_anonymous_mcp: false,
            trust_proxy: false,
            cors_origins: Vec::new(),
            rate_limit: RateLimitSettings::default(),
        }
    }
}
