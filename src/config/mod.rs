mod file_config;

pub use file_config::{FileConfig, RateLimitConfig};

use crate::credentials::{shared_prefixes, ApiKeyRecord, CredentialStore};
use crate::gateway::rate_limit::{
    InMemoryRateLimitStore, RatePolicy, TieredRateLimiter, ANONYMOUS_MAX_REQUESTS,
    AUTHENTICATED_MAX_REQUESTS, DEFAULT_MAX_ENTRIES, DEFAULT_WINDOW_MS,
};
use crate::server::{RequestsLoggingLevel, ServerConfig};
use crate::transport::TransportKind;
use anyhow::{bail, Context, Result};
use axum::http::HeaderValue;
use clap::ValueEnum;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub transport: TransportKind,
    pub bind_address: IpAddr,
    pub port: u16,
    pub metrics_port: Option<u16>,
    pub logging_level: RequestsLoggingLevel,
    pub environment: String,
    pub catalog_path: Option<PathBuf>,
    pub request_timeout_ms: u64,
    pub allow_anonymous_mcp: bool,
    pub trust_proxy: bool,
    pub cors_origins: Vec<String>,
    pub api_keys: Vec<String>,
    pub rate_limit_window_ms: u64,
    pub rate_limit_anonymous_max: u32,
    pub rate_limit_authenticated_max: u32,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Stdio,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            metrics_port: None,
            logging_level: RequestsLoggingLevel::Path,
            environment: DEFAULT_ENVIRONMENT.to_string(),
            catalog_path: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            allow_anonymous_mcp: false,
            trust_proxy: false,
            cors_origins: Vec::new(),
            api_keys: Vec::new(),
            rate_limit_window_ms: DEFAULT_WINDOW_MS,
            rate_limit_anonymous_max: ANONYMOUS_MAX_REQUESTS,
            rate_limit_authenticated_max: AUTHENTICATED_MAX_REQUESTS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub transport: TransportKind,
    pub bind_address: IpAddr,
    pub port: u16,
    pub metrics_port: Option<u16>,
    pub logging_level: RequestsLoggingLevel,
    pub environment: String,
    pub catalog_path: Option<PathBuf>,
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,

    // Gateway settings
    pub allow_anonymous_mcp: bool,
    pub trust_proxy: bool,
    pub cors_origins: Vec<String>,
    pub api_keys: Vec<ApiKeyRecord>,
    pub rate_limit: RateLimitSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitSettings {
    pub window_ms: u64,
    pub anonymous_max: u32,
    pub authenticated_max: u32,
    pub max_entries: usize,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
            anonymous_max: ANONYMOUS_MAX_REQUESTS,
            authenticated_max: AUTHENTICATED_MAX_REQUESTS,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl RateLimitSettings {
    pub fn anonymous_policy(&self) -> RatePolicy {
        RatePolicy::new(self.window_ms, self.anonymous_max)
    }

    pub fn authenticated_policy(&self) -> RatePolicy {
        RatePolicy::new(self.window_ms, self.authenticated_max)
    }

    /// Limiter backed by the in-process ledger.
    pub fn build_limiter(&self) -> TieredRateLimiter {
        TieredRateLimiter::new(
            self.anonymous_policy(),
            self.authenticated_policy(),
            Arc::new(InMemoryRateLimitStore::new(self.max_entries)),
        )
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let transport = match file.transport {
            Some(s) => TransportKind::from_str(&s, true)
                .map_err(|_| anyhow::anyhow!("Unknown transport: {}", s))?,
            None => cli.transport,
        };

        let bind_address = match file.bind_address {
            Some(s) => s
                .parse::<IpAddr>()
                .with_context(|| format!("Invalid bind_address: {}", s))?,
            None => cli.bind_address,
        };

        let port = file.port.unwrap_or(cli.port);
        if port == 0 {
            bail!("port must be greater than zero");
        }
        let metrics_port = file.metrics_port.or(cli.metrics_port);
        if metrics_port == Some(port) {
            bail!("metrics_port must differ from port ({})", port);
        }

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let environment = file.environment.unwrap_or_else(|| cli.environment.clone());
        let catalog_path = file
            .catalog_path
            .map(PathBuf::from)
            .or_else(|| cli.catalog_path.clone());

        let request_timeout_ms = file.request_timeout_ms.unwrap_or(cli.request_timeout_ms);
        if request_timeout_ms == 0 {
            bail!("request_timeout_ms must be greater than zero");
        }
        let shutdown_grace_secs = file
            .shutdown_grace_secs
            .unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS);

        let allow_anonymous_mcp = file.allow_anonymous_mcp.unwrap_or(cli.allow_anonymous_mcp);
        let trust_proxy = file.trust_proxy.unwrap_or(cli.trust_proxy);

        let cors_origins: Vec<String> = file
            .cors_origins
            .unwrap_or_else(|| cli.cors_origins.clone())
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        for origin in cors_origins.iter().filter(|o| o.as_str() != "*") {
            if HeaderValue::from_str(origin).is_err() {
                bail!("Invalid CORS origin: {:?}", origin);
            }
        }

        let rl_file = file.rate_limit.unwrap_or_default();
        let rate_limit = RateLimitSettings {
            window_ms: rl_file.window_ms.unwrap_or(cli.rate_limit_window_ms),
            anonymous_max: rl_file.anonymous_max.unwrap_or(cli.rate_limit_anonymous_max),
            authenticated_max: rl_file
                .authenticated_max
                .unwrap_or(cli.rate_limit_authenticated_max),
            max_entries: rl_file.max_entries.unwrap_or(DEFAULT_MAX_ENTRIES),
        };
        if rate_limit.window_ms == 0 {
            bail!("rate limit window must be greater than zero");
        }
        if rate_limit.anonymous_max == 0 || rate_limit.authenticated_max == 0 {
            bail!("rate limit ceilings must be greater than zero");
        }
        if rate_limit.max_entries == 0 {
            bail!("rate limit max_entries must be greater than zero");
        }

        let api_keys = merge_api_keys(&cli.api_keys, file.api_keys);
        for prefix in shared_prefixes(&api_keys) {
            warn!(
                "Several API keys share the prefix {}: they share one rate limit bucket",
                prefix
            );
        }

        if transport == TransportKind::Http && api_keys.is_empty() && !allow_anonymous_mcp {
            warn!("No API keys configured and anonymous access disabled: every /mcp call will be rejected");
        }

        Ok(Self {
            transport,
            bind_address,
            port,
            metrics_port,
            logging_level,
            environment,
            catalog_path,
            request_timeout: Duration::from_millis(request_timeout_ms),
            shutdown_grace: Duration::from_secs(shutdown_grace_secs),
            allow_anonymous_mcp,
            trust_proxy,
            cors_origins,
            api_keys,
            rate_limit,
        })
    }

    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_port
            .map(|port| SocketAddr::new(self.bind_address, port))
    }

    pub fn credential_store(&self) -> CredentialStore {
        CredentialStore::new(self.api_keys.iter().cloned())
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            requests_logging_level: self.logging_level.clone(),
            bind_address: self.bind_address,
            port: self.port,
            metrics_port: self.metrics_port,
            environment: self.environment.clone(),
            request_timeout: self.request_timeout,
            allow_anonymous_mcp: self.allow_anonymous_mcp,
            trust_proxy: self.trust_proxy,
            cors_origins: self.cors_origins.clone(),
            rate_limit: self.rate_limit.clone(),
        }
    }
}

/// Plain keys from the command line merged with TOML records. A TOML record
/// replaces a plain key with the same value.
fn merge_api_keys(cli_keys: &[String], file_keys: Vec<ApiKeyRecord>) -> Vec<ApiKeyRecord> {
    let mut seen = HashSet::new();
    let mut keys: Vec<ApiKeyRecord> = cli_keys
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .filter(|k| !file_keys.iter().any(|r| r.key == *k))
        .filter(|k| seen.insert(*k))
        .map(ApiKeyRecord::new)
        .collect();
    keys.extend(file_keys.into_iter().filter(|r| !r.key.trim().is_empty()));
    keys
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_logging_level() {
        assert!(matches!(
            parse_logging_level("none"),
            Some(RequestsLoggingLevel::None)
        ));
        assert!(matches!(
            parse_logging_level("headers"),
            Some(RequestsLoggingLevel::Headers)
        ));
        // Case insensitive
        assert!(matches!(
            parse_logging_level("BODY"),
            Some(RequestsLoggingLevel::Body)
        ));
        assert!(parse_logging_level("invalid").is_none());
    }

    #[test]
    fn test_resolve_defaults() {
        let config = AppConfig::resolve(&CliConfig::default(), None).unwrap();

        assert_eq!(config.transport, TransportKind::Stdio);
        assert_eq!(config.port, 3000);
        assert_eq!(config.metrics_port, None);
        assert_eq!(config.request_timeout, Duration::from_millis(5000));
        assert_eq!(config.shutdown_grace, Duration::from_secs(10));
        assert_eq!(config.environment, "development");
        assert_eq!(config.rate_limit, RateLimitSettings::default());
        assert!(!config.allow_anonymous_mcp);
        assert!(config.api_keys.is_empty());
        assert_eq!(config.http_addr().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let cli = CliConfig {
            transport: TransportKind::Stdio,
            port: 3001,
            metrics_port: Some(9091),
            rate_limit_anonymous_max: 50,
            ..Default::default()
        };

        let file_config = FileConfig {
            transport: Some("HTTP".to_string()),
            port: Some(4000),
            logging_level: Some("body".to_string()),
            rate_limit: Some(RateLimitConfig {
                window_ms: Some(1000),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        // TOML values should override CLI
        assert_eq!(config.transport, TransportKind::Http);
        assert_eq!(config.port, 4000);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Body);
        assert_eq!(config.rate_limit.window_ms, 1000);
        // CLI value used when TOML doesn't specify
        assert_eq!(config.metrics_port, Some(9091));
        assert_eq!(config.rate_limit.anonymous_max, 50);
        assert_eq!(config.rate_limit.authenticated_max, 500);
    }

    #[test]
    fn test_resolve_rejects_zero_values() {
        let cli = CliConfig {
            port: 0,
            ..Default::default()
        };
        let err = AppConfig::resolve(&cli, None).unwrap_err();
        assert!(err.to_string().contains("port"));

        let cli = CliConfig {
            rate_limit_window_ms: 0,
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, None).is_err());

        let cli = CliConfig {
            rate_limit_authenticated_max: 0,
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, None).is_err());

        let cli = CliConfig {
            request_timeout_ms: 0,
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, None).is_err());
    }

    #[test]
    fn test_resolve_rejects_invalid_cors_origin() {
        let cli = CliConfig {
            cors_origins: vec!["https://ok.example.com".to_string(), "bad\norigin".to_string()],
            ..Default::default()
        };
        let err = AppConfig::resolve(&cli, None).unwrap_err();
        assert!(err.to_string().contains("Invalid CORS origin"));

        let cli = CliConfig {
            cors_origins: vec!["*".to_string(), " ".to_string()],
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, None).unwrap();
        assert_eq!(config.cors_origins, vec!["*".to_string()]);
    }

    #[test]
    fn test_resolve_rejects_unknown_transport() {
        let file_config = FileConfig {
            transport: Some("carrier-pigeon".to_string()),
            ..Default::default()
        };
        let err = AppConfig::resolve(&CliConfig::default(), Some(file_config)).unwrap_err();
        assert!(err.to_string().contains("Unknown transport"));
    }

    #[test]
    fn test_resolve_metrics_port_must_differ() {
        let cli = CliConfig {
            port: 3000,
            metrics_port: Some(3000),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, None).is_err());
    }

    #[test]
    fn test_api_keys_merge_cli_and_file() {
        let cli = CliConfig {
            api_keys: vec![
                "dsk_one".to_string(),
                " ".to_string(),
                "dsk_two".to_string(),
            ],
            ..Default::default()
        };
        let mut record = ApiKeyRecord::new("dsk_two");
        record.label = Some("from-file".to_string());
        let file_config = FileConfig {
            api_keys: vec![record, ApiKeyRecord::new("dsk_three")],
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();
        let keys: Vec<&str> = config.api_keys.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["dsk_one", "dsk_two", "dsk_three"]);
        assert_eq!(config.api_keys[1].label.as_deref(), Some("from-file"));
        assert_eq!(config.credential_store().len(), 3);
    }

    #[test]
    fn test_resolve_from_toml_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "transport = \"http\"\nmetrics_port = 9100\nallow_anonymous_mcp = true\n"
        )
        .unwrap();

        let file_config = FileConfig::load(file.path()).unwrap();
        let config = AppConfig::resolve(&CliConfig::default(), Some(file_config)).unwrap();
        assert_eq!(config.transport, TransportKind::Http);
        assert!(config.allow_anonymous_mcp);
        assert_eq!(config.metrics_addr().map(|a| a.port()), Some(9100));
    }
}
