//! Process lifecycle: run one transport, stop it on a signal, bound the drain.

use anyhow::{anyhow, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::mcp::McpServer;
use crate::transport::TransportAdapter;

pub struct ProcessSupervisor {
    adapter: Box<dyn TransportAdapter>,
    core: Arc<McpServer>,
    shutdown: CancellationToken,
    grace: Duration,
}

impl ProcessSupervisor {
    pub fn new(adapter: Box<dyn TransportAdapter>, core: Arc<McpServer>, grace: Duration) -> Self {
        Self {
            adapter,
            core,
            shutdown: CancellationToken::new(),
            grace,
        }
    }

    /// Cancelling this token has the same effect as a termination signal.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs until the transport ends or SIGINT/SIGTERM arrives.
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Runs until the transport ends, `signal` resolves or the shutdown
    /// token is cancelled. After that, in-flight work gets `grace` to finish.
    pub async fn run_until(self, signal: impl Future<Output = ()>) -> Result<()> {
        let ProcessSupervisor {
            adapter,
            core,
            shutdown,
            grace,
        } = self;

        let kind = adapter.kind();
        info!("Starting {} transport", kind);
        let mut task = tokio::spawn(adapter.serve(core.clone(), shutdown.clone()));

        tokio::select! {
            joined = &mut task => {
                info!("{} transport stopped", kind);
                return flatten(joined);
            }
            _ = signal => info!("Shutdown signal received, draining in-flight requests"),
            _ = shutdown.cancelled() => info!("Shutdown requested, draining in-flight requests"),
        }
        shutdown.cancel();

        match tokio::time::timeout(grace, &mut task).await {
            Ok(joined) => {
                info!(
                    "{} transport drained ({} sessions served)",
                    kind,
                    core.sessions_opened()
                );
                flatten(joined)
            }
            Err(_) => {
                warn!(
                    "Grace period of {}s elapsed with {} sessions still active, aborting",
                    grace.as_secs(),
                    core.sessions_active()
                );
                task.abort();
                Ok(())
            }
        }
    }
}

fn flatten(joined: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    joined.map_err(|e| anyhow!("Transport task failed: {}", e))?
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
