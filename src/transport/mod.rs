//! Transport adapters
//!
//! A transport moves JSON-RPC messages between clients and the protocol
//! core. Exactly one adapter runs per process, picked from configuration.

mod http;
mod stdio;

pub use http::HttpTransport;
pub use stdio::PipeTransport;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::mcp::McpServer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TransportKind {
    /// Newline-delimited JSON-RPC over stdin/stdout.
    Stdio,
    /// Stateless JSON-RPC over `POST /mcp`.
    Http,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Stdio => write!(f, "stdio"),
            TransportKind::Http => write!(f, "http"),
        }
    }
}

#[async_trait]
pub trait TransportAdapter: Send {
    fn kind(&self) -> TransportKind;

    /// Runs until the client goes away or `shutdown` fires. Work already
    /// accepted when `shutdown` fires is finished before returning.
    async fn serve(self: Box<Self>, core: Arc<McpServer>, shutdown: CancellationToken)
        -> Result<()>;
}
