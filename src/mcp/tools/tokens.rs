//! Design Token Tools

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::DesignToken;
use crate::mcp::context::ToolContext;
use crate::mcp::protocol::{McpError, ToolsCallResult};
use crate::mcp::registry::{McpRegistry, RegisteredTool, ToolBuilder, ToolResult};

pub fn register_tools(registry: &mut McpRegistry) {
    registry.register_tool(get_design_tokens_tool());
}

#[derive(Debug, Deserialize)]
struct GetDesignTokensParams {
    #[serde(default)]
    category: Option<String>,
}

#[derive(Debug, Serialize)]
struct GetDesignTokensResult<'a> {
    tokens: Vec<&'a DesignToken>,
    categories: Vec<String>,
    total: usize,
}

fn get_design_tokens_tool() -> RegisteredTool {
    ToolBuilder::new("get_design_tokens")
        .description("Get design tokens (colors, spacing, typography...), optionally by category")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "category": {
                    "type": "string",
                    "description": "Only return tokens in this category (case-insensitive)"
                }
            }
        }))
        .build(get_design_tokens_handler)
}

async fn get_design_tokens_handler(ctx: ToolContext, params: Value) -> ToolResult {
    let params: GetDesignTokensParams = if params.is_null() {
        GetDesignTokensParams { category: None }
    } else {
        serde_json::from_value(params).map_err(|e| McpError::InvalidParams(e.to_string()))?
    };

    let tokens = ctx.catalog.tokens(params.category.as_deref());
    if tokens.is_empty() {
        if let Some(category) = &params.category {
            return Ok(ToolsCallResult::error(format!(
                "No tokens in category: {}",
                category
            )));
        }
    }

    let total = tokens.len();
    let result = GetDesignTokensResult {
        tokens,
        categories: ctx.catalog.token_categories(),
        total,
    };
    ToolsCallResult::json(&result).map_err(|e| McpError::InternalError(e.to_string()))
}
