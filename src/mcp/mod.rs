//! MCP (Model Context Protocol) Server
//!
//! JSON-RPC 2.0 protocol core exposing the design-system catalog as tools
//! and resources. The core knows nothing about transports; stdio and HTTP
//! both drive it through [`McpSession`].

pub mod context;
pub mod handler;
pub mod protocol;
pub mod registry;
pub mod resources;
pub mod tools;

pub use handler::{create_registry, McpServer, McpSession, SessionMode};
pub use protocol::{McpError, McpPayload, McpRequest, McpResponse};
pub use registry::McpRegistry;
