//! Test server lifecycle management
//!
//! Each test gets an isolated gateway on a random port, run through the same
//! supervisor and HTTP transport as the real binary.
#![allow(dead_code)]

use super::constants::*;
use chrono::{Duration as ChronoDuration, Utc};
use ds_mcp_gateway::config::RateLimitSettings;
use ds_mcp_gateway::mcp::create_registry;
use ds_mcp_gateway::mcp::protocol::ToolsCallResult;
use ds_mcp_gateway::mcp::registry::ToolBuilder;
use ds_mcp_gateway::{
    ApiKeyRecord, Catalog, CredentialStore, HttpTransport, McpServer, ProcessSupervisor,
    RequestsLoggingLevel, ServerConfig,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Knobs for a test server. Defaults match production limits.
#[derive(Clone, Debug)]
pub struct TestServerOptions {
    pub allow_anonymous_mcp: bool,
    pub rate_limit: RateLimitSettings,
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,
    pub cors_origins: Vec<String>,
    pub trust_proxy: bool,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            allow_anonymous_mcp: false,
            rate_limit: RateLimitSettings::default(),
            request_timeout: Duration::from_millis(5000),
            shutdown_grace: Duration::from_secs(10),
            cors_origins: Vec::new(),
            trust_proxy: false,
        }
    }
}

/// Test server instance
///
/// When dropped, the server is told to shut down.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    shutdown: CancellationToken,
    handle: Option<JoinHandle<anyhow::Result<()>>>,
}

fn test_credentials() -> CredentialStore {
    let now = Utc::now();

    let mut revoked = ApiKeyRecord::new(REVOKED_API_KEY);
    revoked.revoked_at = Some(now - ChronoDuration::days(1));

    let mut expired = ApiKeyRecord::new(EXPIRED_API_KEY);
    expired.expires_at = Some(now - ChronoDuration::hours(1));

    CredentialStore::new([
        ApiKeyRecord::new(VALID_API_KEY),
        ApiKeyRecord::new(SECOND_API_KEY),
        revoked,
        expired,
    ])
}

fn test_core() -> Arc<McpServer> {
    let catalog = Arc::new(Catalog::builtin().expect("Failed to load built-in catalog"));

    let mut registry = create_registry();
    registry.register_tool(
        ToolBuilder::new(SLOW_TOOL)
            .description("Echoes its input after sleeping")
            .input_schema(json!({
                "type": "object",
                "properties": {
                    "delay_ms": { "type": "integer" },
                    "message": { "type": "string" }
                }
            }))
            .build(|_ctx, args| async move {
                let delay = args["delay_ms"].as_u64().unwrap_or(100);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                let message = args["message"].as_str().unwrap_or("done").to_string();
                Ok(ToolsCallResult::text(message))
            }),
    );

    Arc::new(McpServer::with_registry(catalog, registry))
}

impl TestServer {
    /// Spawns a new test server on a random port with default options
    pub async fn spawn() -> Self {
        Self::spawn_with(TestServerOptions::default()).await
    }

    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if port binding fails or the server doesn't become ready
    /// within the timeout.
    pub async fn spawn_with(options: TestServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            port,
            environment: "test".to_string(),
            request_timeout: options.request_timeout,
            allow_anonymous_mcp: options.allow_anonymous_mcp,
            trust_proxy: options.trust_proxy,
            cors_origins: options.cors_origins.clone(),
            rate_limit: options.rate_limit.clone(),
            ..Default::default()
        };

        let limiter = Arc::new(options.rate_limit.build_limiter());
        let transport = HttpTransport::new(config, Arc::new(test_credentials()), limiter)
            .with_listener(listener);

        let supervisor =
            ProcessSupervisor::new(Box::new(transport), test_core(), options.shutdown_grace);
        let shutdown = supervisor.shutdown_token();
        let handle = tokio::spawn(supervisor.run_until(std::future::pending::<()>()));

        let server = Self {
            base_url,
            port,
            shutdown,
            handle: Some(handle),
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling /health
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/health", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }

    /// Sends the termination signal without waiting.
    pub fn begin_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Signals shutdown and waits for the supervisor to return.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.shutdown.cancel();
        match self.handle.take() {
            Some(handle) => handle.await.expect("Supervisor task panicked"),
            None => Ok(()),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
