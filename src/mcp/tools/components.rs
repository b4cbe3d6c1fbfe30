//! Component Tools
//!
//! Tools for browsing, reading and searching component metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{CategoryCount, ComponentSummary, SearchHit};
use crate::mcp::context::ToolContext;
use crate::mcp::protocol::{McpError, ToolsCallResult};
use crate::mcp::registry::{McpRegistry, RegisteredTool, ToolBuilder, ToolResult};

pub const DEFAULT_SEARCH_LIMIT: usize = 20;
pub const MAX_SEARCH_LIMIT: usize = 100;

/// Register component tools with the registry
pub fn register_tools(registry: &mut McpRegistry) {
    registry.register_tool(list_components_tool());
    registry.register_tool(get_component_tool());
    registry.register_tool(search_components_tool());
    registry.register_tool(list_categories_tool());
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, McpError> {
    // tools called without arguments get an empty object
    let params = if params.is_null() {
        serde_json::json!({})
    } else {
        params
    };
    serde_json::from_value(params).map_err(|e| McpError::InvalidParams(e.to_string()))
}

fn to_result<T: Serialize>(value: &T) -> ToolResult {
    ToolsCallResult::json(value).map_err(|e| McpError::InternalError(e.to_string()))
}

// ============================================================================
// list_components
// ============================================================================

#[derive(Debug, Deserialize)]
struct ListComponentsParams {
    #[serde(default)]
    category: Option<String>,
}

#[derive(Debug, Serialize)]
struct ListComponentsResult {
    components: Vec<ComponentSummary>,
    total: usize,
}

fn list_components_tool() -> RegisteredTool {
    ToolBuilder::new("list_components")
        .description("List design-system components, optionally filtered by category")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "category": {
                    "type": "string",
                    "description": "Only list components in this category (case-insensitive)"
                }
            }
        }))
        .build(list_components_handler)
}

async fn list_components_handler(ctx: ToolContext, params: Value) -> ToolResult {
    let params: ListComponentsParams = parse_params(params)?;
    let components = ctx.catalog.summaries(params.category.as_deref());
    let total = components.len();
    to_result(&ListComponentsResult { components, total })
}

// ============================================================================
// get_component
// ============================================================================

#[derive(Debug, Deserialize)]
struct GetComponentParams {
    name: String,
}

fn get_component_tool() -> RegisteredTool {
    ToolBuilder::new("get_component")
        .description("Get the full metadata of a component: props, features and dependencies")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Component name (case-insensitive)"
                }
            },
            "required": ["name"]
        }))
        .build(get_component_handler)
}

async fn get_component_handler(ctx: ToolContext, params: Value) -> ToolResult {
    let params: GetComponentParams = parse_params(params)?;
    match ctx.catalog.component(&params.name) {
        Some(component) => to_result(component),
        None => Ok(ToolsCallResult::error(format!(
            "Component not found: {}",
            params.name
        ))),
    }
}

// ============================================================================
// search_components
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchComponentsParams {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

#[derive(Debug, Serialize)]
struct SearchComponentsResult {
    query: String,
    results: Vec<SearchHit>,
    total: usize,
}

fn search_components_tool() -> RegisteredTool {
    ToolBuilder::new("search_components")
        .description("Search components by name, description, category and features")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of results (default 20)",
                    "minimum": 1,
                    "maximum": MAX_SEARCH_LIMIT
                }
            },
            "required": ["query"]
        }))
        .build(search_components_handler)
}

async fn search_components_handler(ctx: ToolContext, params: Value) -> ToolResult {
    let params: SearchComponentsParams = parse_params(params)?;
    if params.query.trim().is_empty() {
        return Err(McpError::InvalidParams("query must not be empty".to_string()));
    }
    let limit = params.limit.clamp(1, MAX_SEARCH_LIMIT);
    let results = ctx.catalog.search(&params.query, limit);
    let total = results.len();
    to_result(&SearchComponentsResult {
        query: params.query,
        results,
        total,
    })
}

// ============================================================================
// list_categories
// ============================================================================

#[derive(Debug, Serialize)]
struct ListCategoriesResult {
    categories: Vec<CategoryCount>,
}

fn list_categories_tool() -> RegisteredTool {
    ToolBuilder::new("list_categories")
        .description("List component categories with the number of components in each")
        .build(list_categories_handler)
}

async fn list_categories_handler(ctx: ToolContext, _params: Value) -> ToolResult {
    to_result(&ListCategoriesResult {
        categories: ctx.catalog.categories(),
    })
}
