//! Catalog Resources
//!
//! - `design-system://components`: every component summary
//! - `design-system://components/{name}`: one component in full
//! - `design-system://tokens`: every design token
//! - `design-system://tokens/{category}`: tokens of one category

use crate::mcp::context::ToolContext;
use crate::mcp::protocol::{McpError, ResourceContent};
use crate::mcp::registry::{uri_param, McpRegistry, RegisteredResource, ResourceBuilder, ResourceResult};

pub const COMPONENTS_URI: &str = "design-system://components";
pub const COMPONENT_URI_TEMPLATE: &str = "design-system://components/{name}";
pub const TOKENS_URI: &str = "design-system://tokens";
pub const TOKENS_URI_TEMPLATE: &str = "design-system://tokens/{category}";

const JSON_MIME: &str = "application/json";

pub fn register_resources(registry: &mut McpRegistry) {
    registry.register_resource(components_resource());
    registry.register_resource(component_template());
    registry.register_resource(tokens_resource());
    registry.register_resource(tokens_template());
}

fn json_content<T: serde::Serialize>(uri: String, value: &T) -> ResourceResult {
    ResourceContent::json(uri, value)
        .map(|content| vec![content])
        .map_err(|e| McpError::InternalError(e.to_string()))
}

fn components_resource() -> RegisteredResource {
    ResourceBuilder::new(COMPONENTS_URI, "Components")
        .description("Summaries of every component in the design system")
        .mime_type(JSON_MIME)
        .build(|ctx: ToolContext, uri: String| async move {
            json_content(uri, &ctx.catalog.summaries(None))
        })
}

fn component_template() -> RegisteredResource {
    ResourceBuilder::new(COMPONENT_URI_TEMPLATE, "Component")
        .description("Full metadata of one component, addressed by name")
        .mime_type(JSON_MIME)
        .build(|ctx: ToolContext, uri: String| async move {
            let Some(name) = uri_param(COMPONENT_URI_TEMPLATE, &uri, "name") else {
                return Err(McpError::ResourceNotFound(uri));
            };
            match ctx.catalog.component(&name) {
                Some(component) => json_content(uri, component),
                None => Err(McpError::ResourceNotFound(uri)),
            }
        })
}

fn tokens_resource() -> RegisteredResource {
    ResourceBuilder::new(TOKENS_URI, "Design tokens")
        .description("Every design token with its value")
        .mime_type(JSON_MIME)
        .build(|ctx: ToolContext, uri: String| async move {
            json_content(uri, &ctx.catalog.tokens(None))
        })
}

fn tokens_template() -> RegisteredResource {
    ResourceBuilder::new(TOKENS_URI_TEMPLATE, "Design tokens by category")
        .description("Design tokens of one category, e.g. color or spacing")
        .mime_type(JSON_MIME)
        .build(|ctx: ToolContext, uri: String| async move {
            let Some(category) = uri_param(TOKENS_URI_TEMPLATE, &uri, "category") else {
                return Err(McpError::ResourceNotFound(uri));
            };
            let tokens = ctx.catalog.tokens(Some(&category));
            if tokens.is_empty() {
                return Err(McpError::ResourceNotFound(uri));
            }
            json_content(uri, &tokens)
        })
}
