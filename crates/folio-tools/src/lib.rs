//! Tool system shared by the chat loop and the MCP surface.
//!
//! Defines the `Tool` trait, a registry for lookup and schema export, and the
//! adapter that turns LLM tool-call invocations into `{success, data?,
//! error?}` JSON for the model's follow-up turn.

pub mod content_tools;

use std::sync::Arc;

use async_trait::async_trait;
use folio_content::ValidationError;
use folio_llm::{ToolCall, ToolDefinition};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Internal(String),
}

/// Trait that all tools implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name for this tool (e.g. "list_content").
    fn name(&self) -> &str;
    /// Human-readable description of what this tool does.
    fn description(&self) -> &str;
    /// JSON Schema for the tool's input parameters.
    fn input_schema(&self) -> serde_json::Value;
    /// Execute the tool with the given input.
    async fn execute(&self, input: serde_json::Value) -> Result<serde_json::Value, ToolError>;
}

/// Lookup table over the registered tools.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Convert the registered tools to API-level tool definitions.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }
}

/// Execute one LLM tool call and fold the outcome into the JSON string fed
/// back to the model. Failures become `{success:false, error}` — never a
/// request-level error.
pub async fn execute_tool_call(registry: &ToolRegistry, call: &ToolCall) -> String {
    let result = match registry.get(&call.name) {
        Some(tool) => {
            debug!(tool = %call.name, id = %call.id, "executing tool call");
            tool.execute(call.arguments.clone()).await
        }
        None => Err(ToolError::InvalidInput(format!(
            "unknown tool: {}",
            call.name
        ))),
    };

    let envelope = match result {
        Ok(data) => serde_json::json!({ "success": true, "data": data }),
        Err(e) => serde_json::json!({ "success": false, "error": e.to_string() }),
    };
    envelope.to_string()
}
