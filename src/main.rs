use anyhow::{Context, Result};
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ds_mcp_gateway::config::{AppConfig, CliConfig, FileConfig};
use ds_mcp_gateway::gateway::rate_limit::{
    ANONYMOUS_MAX_REQUESTS, AUTHENTICATED_MAX_REQUESTS, DEFAULT_WINDOW_MS,
};
use ds_mcp_gateway::server::metrics;
use ds_mcp_gateway::{
    Catalog, HttpTransport, McpServer, PipeTransport, ProcessSupervisor, RequestsLoggingLevel,
    TransportAdapter, TransportKind,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
#[clap(version = ds_mcp_gateway::VERSION)]
struct CliArgs {
    /// Path to a TOML config file. Values in the file override CLI arguments.
    #[clap(long, env = "MCP_CONFIG", value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Which transport to serve the protocol on.
    #[clap(long, env = "MCP_TRANSPORT", default_value = "stdio")]
    pub transport: TransportKind,

    /// Address the HTTP transport binds to.
    #[clap(long, env = "MCP_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: IpAddr,

    /// The port to listen on (HTTP transport).
    #[clap(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping). Disabled if unset.
    #[clap(long, env = "METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// The level of logging to perform on each request.
    #[clap(long, env = "REQUESTS_LOGGING_LEVEL", default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Deployment environment reported by /health.
    #[clap(long, env = "APP_ENV", default_value = "development")]
    pub environment: String,

    /// Path to a catalog JSON file. The built-in catalog is used if unset.
    #[clap(long, env = "CATALOG_PATH", value_parser = parse_path)]
    pub catalog_path: Option<PathBuf>,

    /// Per-request timeout for /mcp in milliseconds.
    #[clap(long, env = "REQUEST_TIMEOUT_MS", default_value_t = 5000)]
    pub request_timeout_ms: u64,

    /// Accepted API keys, comma separated.
    #[clap(long, env = "MCP_API_KEYS", value_delimiter = ',', hide_env_values = true)]
    pub api_keys: Vec<String>,

    /// Let requests without credentials reach /mcp under the anonymous tier.
    #[clap(long, env = "MCP_ALLOW_ANONYMOUS")]
    pub allow_anonymous: bool,

    /// Allowed CORS origins, comma separated. `*` allows any origin.
    #[clap(long, env = "CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Take the client address from X-Forwarded-For.
    #[clap(long, env = "TRUST_PROXY")]
    pub trust_proxy: bool,

    /// Rate limit window in milliseconds, shared by both tiers.
    #[clap(long, env = "RATE_LIMIT_WINDOW_MS", default_value_t = DEFAULT_WINDOW_MS)]
    pub rate_limit_window_ms: u64,

    /// Requests per window for anonymous clients, keyed by address.
    #[clap(long, env = "RATE_LIMIT_MAX_REQUESTS", default_value_t = ANONYMOUS_MAX_REQUESTS)]
    pub rate_limit_max_requests: u32,

    /// Requests per window for authenticated clients, keyed by API key prefix.
    #[clap(
        long,
        env = "RATE_LIMIT_AUTHENTICATED_MAX_REQUESTS",
        default_value_t = AUTHENTICATED_MAX_REQUESTS
    )]
    pub rate_limit_authenticated_max_requests: u32,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            transport: self.transport,
            bind_address: self.bind_address,
            port: self.port,
            metrics_port: self.metrics_port,
            logging_level: self.logging_level.clone(),
            environment: self.environment.clone(),
            catalog_path: self.catalog_path.clone(),
            request_timeout_ms: self.request_timeout_ms,
            allow_anonymous_mcp: self.allow_anonymous,
            trust_proxy: self.trust_proxy,
            cors_origins: self.cors_origins.clone(),
            api_keys: self.api_keys.clone(),
            rate_limit_window_ms: self.rate_limit_window_ms,
            rate_limit_anonymous_max: self.rate_limit_max_requests,
            rate_limit_authenticated_max: self.rate_limit_authenticated_max_requests,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    // stdout belongs to the protocol in stdio mode, so logs always go to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let app_config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    let catalog = Arc::new(Catalog::load(app_config.catalog_path.as_deref())?);
    info!(
        "Catalog loaded: {} components, {} design tokens",
        catalog.component_count(),
        catalog.token_count()
    );

    info!("Initializing metrics...");
    metrics::init_metrics();
    metrics::init_catalog_metrics(catalog.component_count(), catalog.token_count());

    let core = Arc::new(McpServer::new(catalog));

    let adapter: Box<dyn TransportAdapter> = match app_config.transport {
        TransportKind::Stdio => Box::new(PipeTransport::stdio()),
        TransportKind::Http => Box::new(HttpTransport::new(
            app_config.server_config(),
            Arc::new(app_config.credential_store()),
            Arc::new(app_config.rate_limit.build_limiter()),
        )),
    };

    info!(
        "Design-system MCP gateway {} ({}, {})",
        ds_mcp_gateway::VERSION,
        app_config.transport,
        app_config.environment
    );

    ProcessSupervisor::new(adapter, core, app_config.shutdown_grace)
        .run()
        .await
}
