//! MCP Tools
//!
//! Tool implementations over the design-system catalog.

pub mod components;
pub mod tokens;

use super::registry::McpRegistry;

/// Register all tools with the registry
pub fn register_all_tools(registry: &mut McpRegistry) {
    components::register_tools(registry);
    tokens::register_tools(registry);
}
