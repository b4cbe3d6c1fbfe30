//! MCP Tool Execution Context
//!
//! Provides access to server state for tool implementations.

use std::sync::Arc;
use std::time::Instant;

use crate::catalog::Catalog;

/// Context provided to tool and resource handlers during execution
#[derive(Clone)]
pub struct ToolContext {
    /// Design-system metadata being served
    pub catalog: Arc<Catalog>,

    /// Server version info
    pub server_version: String,

    /// Server start time (for uptime calculation)
    pub start_time: Instant,
}
