//! MCP Resources
//!
//! Read-only views of the catalog addressed by `design-system://` URIs.

pub mod catalog;

use super::registry::McpRegistry;

/// Register all resources with the registry
pub fn register_all_resources(registry: &mut McpRegistry) {
    catalog::register_resources(registry);
}
