//! Design-System MCP Gateway Library
//!
//! Serves design-system component metadata to AI tooling clients over the
//! Model Context Protocol, either on a local stdin/stdout pipe or on a
//! stateless HTTP endpoint guarded by API keys and tiered rate limits.
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod catalog;
pub mod config;
pub mod credentials;
pub mod gateway;
pub mod mcp;
pub mod server;
pub mod supervisor;
pub mod transport;

/// Version string reported by `/health`, `/api/docs` and the MCP handshake.
pub const VERSION: &str = concat!(env!("APP_VERSION"), "-", env!("GIT_HASH"));

// Re-export commonly used types for convenience
pub use catalog::Catalog;
pub use credentials::{ApiKeyRecord, CredentialStore};
pub use mcp::McpServer;
pub use server::{run_server, RequestsLoggingLevel, ServerConfig};
pub use supervisor::ProcessSupervisor;
pub use transport::{HttpTransport, PipeTransport, TransportAdapter, TransportKind};
