//! Transport-independent JSON-RPC dispatch for the MCP surface.

use std::sync::Arc;

use folio_content::ContentRepository;
use folio_tools::{content_tools, ToolError, ToolRegistry};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

pub const PROTOCOL_VERSION: &str = "2025-06-18";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const RESOURCE_NOT_FOUND: i64 = -32001;
pub const VALIDATION_FAILED: i64 = -32002;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl McpError {
    pub fn code(&self) -> i64 {
        match self {
            McpError::InvalidRequest(_) => INVALID_REQUEST,
            McpError::MethodNotFound(_) => METHOD_NOT_FOUND,
            McpError::InvalidParams(_) => INVALID_PARAMS,
            McpError::ResourceNotFound(_) => RESOURCE_NOT_FOUND,
            McpError::ValidationFailed(_) => VALIDATION_FAILED,
            McpError::Internal(_) => INTERNAL_ERROR,
        }
    }
}

impl From<ToolError> for McpError {
    fn from(e: ToolError) -> Self {
        match e {
            ToolError::InvalidInput(m) => McpError::InvalidParams(m),
            ToolError::NotFound(m) => McpError::ResourceNotFound(m),
            ToolError::Conflict(m) => McpError::ValidationFailed(m),
            ToolError::Validation(v) => McpError::ValidationFailed(v.to_string()),
            ToolError::Internal(m) => McpError::Internal(m),
        }
    }
}

/// One MCP server instance: the six content tools plus resources and prompts.
pub struct McpServer {
    repo: Arc<ContentRepository>,
    tools: ToolRegistry,
}

impl McpServer {
    pub fn new(repo: Arc<ContentRepository>) -> Self {
        let tools = content_tools::mcp_registry(repo.clone(), "mcp");
        Self { repo, tools }
    }

    /// `SELECT 1` against the backing store.
    pub fn ping_db(&self) -> anyhow::Result<()> {
        self.repo.ping().map_err(|e| anyhow::anyhow!(e))
    }

    /// Dispatch one JSON-RPC request. Notifications (no `id`) return `None`.
    pub async fn handle(&self, request: &Value) -> Option<Value> {
        let id = request.get("id").cloned();
        let method = request.get("method").and_then(Value::as_str).unwrap_or("");
        let params = request.get("params").cloned().unwrap_or(json!({}));
        let is_notification = id.is_none();

        debug!(method, notification = is_notification, "mcp request");

        if method.starts_with("notifications/") {
            return None;
        }
        let id = id.unwrap_or(Value::Null);

        let result = self.dispatch(method, &params).await;
        match result {
            Ok(result) => Some(ok_response(id, result)),
            Err(e) if is_notification => {
                debug!(method, error = %e, "error handling notification; dropped");
                None
            }
            Err(e) => Some(err_response(id, e.code(), &e.to_string())),
        }
    }

    async fn dispatch(&self, method: &str, params: &Value) -> Result<Value, McpError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {},
                    "resources": {},
                    "prompts": {}
                },
                "serverInfo": {
                    "name": "folio",
                    "version": env!("CARGO_PKG_VERSION")
                }
            })),

            "ping" => Ok(json!({})),

            "tools/list" => {
                let tools: Vec<Value> = self
                    .tools
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name(),
                            "description": t.description(),
                            "inputSchema": t.input_schema(),
                        })
                    })
                    .collect();
                Ok(json!({ "tools": tools }))
            }

            "tools/call" => {
                let name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| McpError::InvalidParams("missing tool name".to_string()))?;
                let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

                let tool = self.tools.get(name).ok_or_else(|| {
                    McpError::MethodNotFound(format!("unknown tool: {name}"))
                })?;
                let data = tool.execute(arguments).await.map_err(McpError::from)?;
                Ok(json!({
                    "content": [{ "type": "text", "text": data.to_string() }],
                    "isError": false
                }))
            }

            "resources/list" => Ok(json!({
                "resources": crate::resources::list_resources()
            })),

            "resources/read" => {
                let uri = params
                    .get("uri")
                    .and_then(Value::as_str)
                    .ok_or_else(|| McpError::InvalidParams("missing uri".to_string()))?;
                let contents = crate::resources::read_resource(&self.repo, uri)?;
                Ok(json!({ "contents": [contents] }))
            }

            "prompts/list" => Ok(json!({
                "prompts": crate::prompts::list_prompts()
            })),

            "prompts/get" => {
                let name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| McpError::InvalidParams("missing prompt name".to_string()))?;
                let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
                let (description, text) = crate::prompts::get_prompt(name, &arguments)?;
                Ok(json!({
                    "description": description,
                    "messages": [{
                        "role": "user",
                        "content": { "type": "text", "text": text }
                    }]
                }))
            }

            other => Err(McpError::MethodNotFound(other.to_string())),
        }
    }
}

pub fn ok_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

pub fn err_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}
