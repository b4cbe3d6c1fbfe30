use anyhow::Result;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{TransportAdapter, TransportKind};
use crate::credentials::CredentialStore;
use crate::gateway::rate_limit::now_millis;
use crate::gateway::TieredRateLimiter;
use crate::mcp::McpServer;
use crate::server::{make_app, metrics, run_server, serve, ServerConfig, ServerState};

/// Stateless MCP over HTTP behind the gateway pipeline.
pub struct HttpTransport {
    config: ServerConfig,
    credentials: Arc<CredentialStore>,
    rate_limiter: Arc<TieredRateLimiter>,
    listener: Option<TcpListener>,
}

impl HttpTransport {
    pub fn new(
        config: ServerConfig,
        credentials: Arc<CredentialStore>,
        rate_limiter: Arc<TieredRateLimiter>,
    ) -> Self {
        Self {
            config,
            credentials,
            rate_limiter,
            listener: None,
        }
    }

    /// Serve on an already bound listener instead of `bind_address:port`.
    pub fn with_listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }
}

/// Periodically drops rate limit counters of past windows.
async fn sweep_rate_limits(
    limiter: Arc<TieredRateLimiter>,
    every: Duration,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(every.max(Duration::from_millis(1)));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let removed = limiter.store().sweep(now_millis()).await;
                if removed > 0 {
                    debug!("Swept {} expired rate limit counters", removed);
                }
            }
        }
    }
}

async fn serve_http(
    listener: Option<TcpListener>,
    state: ServerState,
    shutdown: CancellationToken,
) -> Result<()> {
    match listener {
        Some(listener) => {
            info!("MCP gateway listening on http://{}", listener.local_addr()?);
            serve(listener, make_app(state)?, shutdown).await
        }
        None => run_server(state, shutdown).await,
    }
}

#[async_trait]
impl TransportAdapter for HttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    async fn serve(self: Box<Self>, core: Arc<McpServer>, shutdown: CancellationToken) -> Result<()> {
        let HttpTransport {
            config,
            credentials,
            rate_limiter,
            listener,
        } = *self;

        info!(
            "HTTP gateway: {} API keys, anonymous /mcp {}",
            credentials.len(),
            if config.allow_anonymous_mcp { "allowed" } else { "denied" }
        );

        // Background tasks stop with the server, even when it fails.
        let background = shutdown.child_token();

        let sweep_every = Duration::from_millis(config.rate_limit.window_ms.max(1));
        tokio::spawn(sweep_rate_limits(
            rate_limiter.clone(),
            sweep_every,
            background.clone(),
        ));

        if let Some(port) = config.metrics_port {
            let addr = SocketAddr::new(config.bind_address, port);
            let token = background.clone();
            tokio::spawn(async move {
                if let Err(e) = metrics::serve_metrics(addr, token).await {
                    error!("Metrics server error: {:#}", e);
                }
            });
        }

        let state = ServerState::new(config, core, credentials, rate_limiter);
        let result = serve_http(listener, state, shutdown).await;

        background.cancel();
        result
    }
}
