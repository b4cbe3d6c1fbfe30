//! MCP Protocol Core
//!
//! Transport-agnostic message handling. A transport opens an [`McpSession`]
//! on the shared [`McpServer`] and feeds it raw JSON-RPC text; the session
//! answers with the response payload, if any.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::context::ToolContext;
use super::protocol::{
    methods, negotiate_protocol_version, ClientInfo, InitializeParams, InitializeResult,
    McpError, McpPayload, McpRequest, McpResponse, PingResult, RequestId, ResourceTemplatesListResult,
    ResourcesCapability, ResourcesListResult, ResourcesReadParams, ResourcesReadResult,
    ServerCapabilities, ServerInfo, ToolsCallParams, ToolsCapability, ToolsListResult,
    JSONRPC_VERSION,
};
use super::registry::McpRegistry;
use crate::catalog::Catalog;
use crate::server::metrics;

pub const SERVER_NAME: &str = "design-system-mcp";

const INSTRUCTIONS: &str = "Use list_components, search_components and get_component to \
discover design-system components, and get_design_tokens for colors, spacing and typography.";

/// Whether a session outlives a single exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// One session for the whole connection; `initialize` must come first.
    Persistent,
    /// One session per request; no handshake is required.
    Stateless,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Persistent => "persistent",
            SessionMode::Stateless => "stateless",
        }
    }
}

/// Create the registry with every built-in tool and resource
pub fn create_registry() -> McpRegistry {
    let mut registry = McpRegistry::new();
    super::tools::register_all_tools(&mut registry);
    super::resources::register_all_resources(&mut registry);
    registry
}

/// Shared, immutable protocol server. Sessions borrow it through an `Arc`.
pub struct McpServer {
    registry: McpRegistry,
    catalog: Arc<Catalog>,
    start_time: Instant,
    version: String,
    sessions_opened: AtomicU64,
    sessions_active: AtomicUsize,
}

impl McpServer {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self::with_registry(catalog, create_registry())
    }

    pub fn with_registry(catalog: Arc<Catalog>, registry: McpRegistry) -> Self {
        info!(
            "MCP registry initialized with {} tools and {} resources",
            registry.tool_count(),
            registry.resource_count()
        );
        Self {
            registry,
            catalog,
            start_time: Instant::now(),
            version: crate::VERSION.to_string(),
            sessions_opened: AtomicU64::new(0),
            sessions_active: AtomicUsize::new(0),
        }
    }

    pub fn open_session(self: &Arc<Self>, mode: SessionMode) -> McpSession {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
        metrics::record_session_opened(mode.as_str());
        McpSession {
            server: Arc::clone(self),
            mode,
            initialized: false,
            client_info: None,
            closed: false,
        }
    }

    pub fn registry(&self) -> &McpRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    /// Sessions opened since startup.
    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened.load(Ordering::Relaxed)
    }

    /// Sessions not yet dropped.
    pub fn sessions_active(&self) -> usize {
        self.sessions_active.load(Ordering::Relaxed)
    }

    fn tool_context(&self) -> ToolContext {
        ToolContext {
            catalog: self.catalog.clone(),
            server_version: self.version.clone(),
            start_time: self.start_time,
        }
    }
}

/// Binding between one transport and the protocol server.
pub struct McpSession {
    server: Arc<McpServer>,
    mode: SessionMode,
    initialized: bool,
    client_info: Option<ClientInfo>,
    closed: bool,
}

impl McpSession {
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn client_info(&self) -> Option<&ClientInfo> {
        self.client_info.as_ref()
    }

    /// Set once the client sent `shutdown`.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Handles raw message text. Returns `None` when nothing must be sent
    /// back (notifications only).
    pub async fn handle_message(&mut self, text: &str) -> Option<McpPayload> {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => self.handle_value(value).await,
            Err(e) => Some(McpPayload::Single(McpResponse::error(
                None,
                McpError::ParseError(e.to_string()),
            ))),
        }
    }

    /// Handles one already-parsed message or batch.
    pub async fn handle_value(&mut self, value: Value) -> Option<McpPayload> {
        match value {
            Value::Array(items) => {
                if items.is_empty() {
                    return Some(McpPayload::Single(McpResponse::error(
                        None,
                        McpError::InvalidRequest("Empty batch".to_string()),
                    )));
                }
                let mut responses = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(response) = self.handle_entry(item).await {
                        responses.push(response);
                    }
                }
                (!responses.is_empty()).then_some(McpPayload::Batch(responses))
            }
            single => self.handle_entry(single).await.map(McpPayload::Single),
        }
    }

    async fn handle_entry(&mut self, value: Value) -> Option<McpResponse> {
        let fallback_id = value
            .get("id")
            .cloned()
            .and_then(|id| serde_json::from_value::<RequestId>(id).ok());

        let request: McpRequest = match serde_json::from_value(value) {
            Ok(req) => req,
            Err(e) => {
                return Some(McpResponse::error(
                    fallback_id,
                    McpError::InvalidRequest(e.to_string()),
                ));
            }
        };
        if request.jsonrpc != JSONRPC_VERSION {
            return Some(McpResponse::error(
                request.id,
                McpError::InvalidRequest(format!("Unsupported jsonrpc version: {}", request.jsonrpc)),
            ));
        }

        self.handle_request(request).await
    }

    async fn handle_request(&mut self, request: McpRequest) -> Option<McpResponse> {
        if request.is_notification() {
            self.handle_notification(&request);
            return None;
        }
        let request_id = request.id.clone()?;

        let result = match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(&request),
            methods::PING => to_value(PingResult {}),
            methods::SHUTDOWN => {
                debug!("Client requested shutdown");
                self.closed = true;
                Ok(serde_json::json!({}))
            }
            methods::TOOLS_LIST
            | methods::TOOLS_CALL
            | methods::RESOURCES_LIST
            | methods::RESOURCES_TEMPLATES_LIST
            | methods::RESOURCES_READ
                if !self.ready() =>
            {
                Err(McpError::InvalidRequest("Not initialized".to_string()))
            }
            methods::TOOLS_LIST => self.handle_tools_list(),
            methods::TOOLS_CALL => self.handle_tools_call(&request).await,
            methods::RESOURCES_LIST => self.handle_resources_list(),
            methods::RESOURCES_TEMPLATES_LIST => self.handle_resource_templates_list(),
            methods::RESOURCES_READ => self.handle_resources_read(&request).await,
            other => Err(McpError::MethodNotFound(other.to_string())),
        };

        Some(match result {
            Ok(value) => McpResponse::success(request_id, value),
            Err(error) => {
                if let McpError::InternalError(detail) = &error {
                    warn!("MCP {} failed: {}", request.method, detail);
                }
                McpResponse::error(Some(request_id), error)
            }
        })
    }

    fn ready(&self) -> bool {
        self.initialized || self.mode == SessionMode::Stateless
    }

    fn handle_notification(&mut self, request: &McpRequest) {
        match request.method.as_str() {
            methods::INITIALIZED => debug!("Client confirmed initialization"),
            other if other.starts_with(methods::NOTIFICATION_PREFIX) => {
                debug!("Ignoring notification {}", other)
            }
            other => debug!("Ignoring request without id: {}", other),
        }
    }

    fn handle_initialize(&mut self, request: &McpRequest) -> Result<Value, McpError> {
        let params: Option<InitializeParams> = request
            .params
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| McpError::InvalidParams(e.to_string()))?;

        let protocol_version = match &params {
            Some(params) => negotiate_protocol_version(&params.protocol_version),
            None => negotiate_protocol_version(""),
        };
        if let Some(params) = params {
            debug!(
                "Initialize from {} {} (protocol {})",
                params.client_info.name, params.client_info.version, params.protocol_version
            );
            self.client_info = Some(params.client_info);
        }
        self.initialized = true;

        to_value(InitializeResult {
            protocol_version: protocol_version.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: None }),
                resources: Some(ResourcesCapability {
                    subscribe: Some(false),
                    list_changed: None,
                }),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: self.server.version.clone(),
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        })
    }

    fn handle_tools_list(&self) -> Result<Value, McpError> {
        to_value(ToolsListResult {
            tools: self.server.registry.tool_definitions(),
        })
    }

    async fn handle_tools_call(&self, request: &McpRequest) -> Result<Value, McpError> {
        let params: ToolsCallParams = required_params(request)?;

        let tool = self
            .server
            .registry
            .get_tool(&params.name)
            .ok_or_else(|| McpError::InvalidParams(format!("Unknown tool: {}", params.name)))?;

        let arguments = params.arguments.unwrap_or_else(|| serde_json::json!({}));
        let result = (tool.handler)(self.server.tool_context(), arguments).await;

        let outcome = match &result {
            Ok(r) if r.is_error() => "tool_error",
            Ok(_) => "ok",
            Err(_) => "error",
        };
        metrics::record_tool_call(&params.name, outcome);

        to_value(result?)
    }

    fn handle_resources_list(&self) -> Result<Value, McpError> {
        to_value(ResourcesListResult {
            resources: self.server.registry.resource_definitions(),
        })
    }

    fn handle_resource_templates_list(&self) -> Result<Value, McpError> {
        to_value(ResourceTemplatesListResult {
            resource_templates: self.server.registry.resource_template_definitions(),
        })
    }

    async fn handle_resources_read(&self, request: &McpRequest) -> Result<Value, McpError> {
        let params: ResourcesReadParams = required_params(request)?;

        let resource = self
            .server
            .registry
            .find_resource(&params.uri)
            .ok_or_else(|| McpError::ResourceNotFound(params.uri.clone()))?;

        let contents = (resource.handler)(self.server.tool_context(), params.uri).await?;
        to_value(ResourcesReadResult { contents })
    }
}

impl Drop for McpSession {
    fn drop(&mut self) {
        self.server.sessions_active.fetch_sub(1, Ordering::Relaxed);
        metrics::record_session_closed();
    }
}

fn required_params<T: serde::de::DeserializeOwned>(request: &McpRequest) -> Result<T, McpError> {
    request
        .params
        .clone()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| McpError::InvalidParams(e.to_string()))?
        .ok_or_else(|| McpError::InvalidParams("Missing params".to_string()))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, McpError> {
    serde_json::to_value(value).map_err(|e| McpError::InternalError(e.to_string()))
}
