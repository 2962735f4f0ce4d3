//! The six content tools: three read-only (shared with the chat loop) and
//! three write tools (MCP surface only).

use std::sync::Arc;

use async_trait::async_trait;
use folio_content::{
    ContentError, ContentRepository, ContentStatus, ContentType, CreateContent, ListQuery,
    UpdateContent,
};
use serde_json::Value;

use crate::{Tool, ToolError, ToolRegistry};

/// Top-level string fields consulted by `search_content`.
const SEARCH_FIELDS: &[&str] = &["title", "description", "name", "content", "company", "role"];

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 100;
const DEFAULT_SEARCH_LIMIT: usize = 10;
const MAX_SEARCH_LIMIT: usize = 50;

/// The read-only tools exposed to both the chat loop and MCP.
pub fn read_tools(repo: Arc<ContentRepository>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ListContentTool { repo: repo.clone() }),
        Arc::new(GetContentTool { repo: repo.clone() }),
        Arc::new(SearchContentTool { repo }),
    ]
}

/// The write tools, exposed only to MCP. `changed_by` is recorded on every
/// history row these tools produce.
pub fn write_tools(repo: Arc<ContentRepository>, changed_by: &str) -> Vec<Arc<dyn Tool>> {
    let changed_by = changed_by.to_string();
    vec![
        Arc::new(CreateContentTool {
            repo: repo.clone(),
            changed_by: changed_by.clone(),
        }),
        Arc::new(UpdateContentTool {
            repo: repo.clone(),
            changed_by: changed_by.clone(),
        }),
        Arc::new(DeleteContentTool { repo, changed_by }),
    ]
}

/// Registry with the read tools only — what the chat loop sees.
pub fn chat_registry(repo: Arc<ContentRepository>) -> ToolRegistry {
    ToolRegistry::new(read_tools(repo))
}

/// Registry with all six tools — what MCP sessions see.
pub fn mcp_registry(repo: Arc<ContentRepository>, changed_by: &str) -> ToolRegistry {
    let mut tools = read_tools(repo.clone());
    tools.extend(write_tools(repo, changed_by));
    ToolRegistry::new(tools)
}

pub struct ListContentTool {
    repo: Arc<ContentRepository>,
}

#[async_trait]
impl Tool for ListContentTool {
    fn name(&self) -> &str {
        "list_content"
    }

    fn description(&self) -> &str {
        "List portfolio content items of a given type. Returns published items unless another status is requested."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "type": {
                    "type": "string",
                    "enum": ["project", "experience", "education", "skill", "about", "contact"],
                    "description": "Content type to list"
                },
                "status": {
                    "type": "string",
                    "enum": ["draft", "published", "archived"],
                    "default": "published"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_LIST_LIMIT,
                    "default": DEFAULT_LIST_LIMIT
                }
            },
            "required": ["type"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let content_type = require_type(&input)?;
        let status = match input.get("status").and_then(Value::as_str) {
            Some(s) => ContentStatus::parse(s).map_err(|e| ToolError::InvalidInput(e.to_string()))?,
            None => ContentStatus::Published,
        };
        let limit = input
            .get("limit")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);

        let items = self
            .repo
            .find_all(&ListQuery::clamped(
                Some(content_type),
                Some(status),
                false,
                Some(limit),
                None,
            ))
            .map_err(map_content_err)?;
        to_items_json(items)
    }
}

pub struct GetContentTool {
    repo: Arc<ContentRepository>,
}

#[async_trait]
impl Tool for GetContentTool {
    fn name(&self) -> &str {
        "get_content"
    }

    fn description(&self) -> &str {
        "Fetch a single content item by type and slug."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "type": {
                    "type": "string",
                    "enum": ["project", "experience", "education", "skill", "about", "contact"]
                },
                "slug": { "type": "string" }
            },
            "required": ["type", "slug"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let content_type = require_type(&input)?;
        let slug = require_str(&input, "slug")?;

        let item = self
            .repo
            .find_by_slug(content_type, slug)
            .map_err(map_content_err)?
            .ok_or_else(|| ToolError::NotFound(format!("{content_type}/{slug}")))?;
        Ok(serde_json::json!({
            "item": serde_json::to_value(item).map_err(internal)?
        }))
    }
}

pub struct SearchContentTool {
    repo: Arc<ContentRepository>,
}

#[async_trait]
impl Tool for SearchContentTool {
    fn name(&self) -> &str {
        "search_content"
    }

    fn description(&self) -> &str {
        "Case-insensitive substring search across published content. Matches titles, descriptions, names, companies, roles, tags, and list entries."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "type": {
                    "type": "string",
                    "enum": ["project", "experience", "education", "skill", "about", "contact"]
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_SEARCH_LIMIT,
                    "default": DEFAULT_SEARCH_LIMIT
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let query = require_str(&input, "query")?.to_lowercase();
        let content_type = optional_type(&input)?;
        let limit = input
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_SEARCH_LIMIT as u64)
            .clamp(1, MAX_SEARCH_LIMIT as u64) as usize;

        let mut items = self
            .repo
            .find_published(content_type)
            .map_err(map_content_err)?;
        items.retain(|item| matches_query(&item.data, &query));
        items.truncate(limit);
        to_items_json(items)
    }
}

pub struct CreateContentTool {
    repo: Arc<ContentRepository>,
    changed_by: String,
}

#[async_trait]
impl Tool for CreateContentTool {
    fn name(&self) -> &str {
        "create_content"
    }

    fn description(&self) -> &str {
        "Create a content item. When no slug is given one is derived from the data's title or name."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "type": {
                    "type": "string",
                    "enum": ["project", "experience", "education", "skill", "about", "contact"]
                },
                "slug": { "type": "string", "pattern": "^[a-z0-9-]{1,100}$" },
                "data": { "type": "object" },
                "status": {
                    "type": "string",
                    "enum": ["draft", "published", "archived"],
                    "default": "draft"
                },
                "sortOrder": { "type": "integer" }
            },
            "required": ["type", "data"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let content_type = require_type(&input)?;
        let data = input
            .get("data")
            .cloned()
            .ok_or_else(|| ToolError::InvalidInput("missing required parameter: data".to_string()))?;
        folio_content::validate_content_data(content_type, &data)?;

        let slug = match input.get("slug").and_then(Value::as_str) {
            Some(s) => s.to_string(),
            None => derive_slug(&data).ok_or_else(|| {
                ToolError::InvalidInput(
                    "no slug given and data has no title or name to derive one from".to_string(),
                )
            })?,
        };
        let status = match input.get("status").and_then(Value::as_str) {
            Some(s) => Some(ContentStatus::parse(s).map_err(|e| ToolError::InvalidInput(e.to_string()))?),
            None => None,
        };

        let item = self
            .repo
            .create(
                CreateContent {
                    content_type,
                    slug,
                    data,
                    status,
                    sort_order: input.get("sortOrder").and_then(Value::as_i64),
                },
                Some(&self.changed_by),
            )
            .map_err(map_content_err)?;
        Ok(serde_json::json!({
            "item": serde_json::to_value(item).map_err(internal)?
        }))
    }
}

pub struct UpdateContentTool {
    repo: Arc<ContentRepository>,
    changed_by: String,
}

#[async_trait]
impl Tool for UpdateContentTool {
    fn name(&self) -> &str {
        "update_content"
    }

    fn description(&self) -> &str {
        "Update a content item by id. Only the provided fields change; every update records a history snapshot."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "slug": { "type": "string", "pattern": "^[a-z0-9-]{1,100}$" },
                "data": { "type": "object" },
                "status": {
                    "type": "string",
                    "enum": ["draft", "published", "archived"]
                },
                "sortOrder": { "type": "integer" }
            },
            "required": ["id"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let id = require_str(&input, "id")?;

        let existing = self
            .repo
            .find_by_id(id)
            .map_err(map_content_err)?
            .ok_or_else(|| ToolError::NotFound(id.to_string()))?;

        let data = input.get("data").cloned();
        if let Some(ref data) = data {
            folio_content::validate_content_data(existing.content_type, data)?;
        }
        let status = match input.get("status").and_then(Value::as_str) {
            Some(s) => Some(ContentStatus::parse(s).map_err(|e| ToolError::InvalidInput(e.to_string()))?),
            None => None,
        };

        let item = self
            .repo
            .update_with_history(
                id,
                UpdateContent {
                    slug: input
                        .get("slug")
                        .and_then(Value::as_str)
                        .map(String::from),
                    data,
                    status,
                    sort_order: input.get("sortOrder").and_then(Value::as_i64),
                },
                Some(&self.changed_by),
            )
            .map_err(map_content_err)?;
        Ok(serde_json::json!({
            "item": serde_json::to_value(item).map_err(internal)?
        }))
    }
}

pub struct DeleteContentTool {
    repo: Arc<ContentRepository>,
    changed_by: String,
}

#[async_trait]
impl Tool for DeleteContentTool {
    fn name(&self) -> &str {
        "delete_content"
    }

    fn description(&self) -> &str {
        "Delete a content item by id. Soft by default; hard=true removes the row and its history."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "hard": { "type": "boolean", "default": false }
            },
            "required": ["id"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let id = require_str(&input, "id")?;
        let hard = input.get("hard").and_then(Value::as_bool).unwrap_or(false);

        if hard {
            self.repo.hard_delete(id).map_err(map_content_err)?;
        } else {
            self.repo
                .delete(id, Some(&self.changed_by))
                .map_err(map_content_err)?;
        }
        Ok(serde_json::json!({ "deleted": true, "id": id, "hard": hard }))
    }
}

/// Derive a slug from `data.title ?? data.name`: lowercase, non-alphanumerics
/// become hyphens, runs collapse, edges trim, capped at 100 chars.
pub fn derive_slug(data: &Value) -> Option<String> {
    let source = data
        .get("title")
        .and_then(Value::as_str)
        .or_else(|| data.get("name").and_then(Value::as_str))?;

    let mut slug = String::with_capacity(source.len());
    let mut pending_dash = false;
    for c in source.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(c);
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    slug.truncate(100);
    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.is_empty() {
        None
    } else {
        Some(slug)
    }
}

/// Linear search predicate: top-level string fields, string tags, and the
/// same fields inside `data.items[]`.
fn matches_query(data: &Value, query_lower: &str) -> bool {
    if fields_match(data, query_lower) {
        return true;
    }
    if let Some(tags) = data.get("tags").and_then(Value::as_array) {
        if tags
            .iter()
            .filter_map(Value::as_str)
            .any(|t| t.to_lowercase().contains(query_lower))
        {
            return true;
        }
    }
    if let Some(items) = data.get("items").and_then(Value::as_array) {
        if items.iter().any(|item| fields_match(item, query_lower)) {
            return true;
        }
    }
    false
}

fn fields_match(obj: &Value, query_lower: &str) -> bool {
    SEARCH_FIELDS.iter().any(|field| {
        obj.get(field)
            .and_then(Value::as_str)
            .map(|s| s.to_lowercase().contains(query_lower))
            .unwrap_or(false)
    })
}

fn require_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    input
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidInput(format!("missing required parameter: {key}")))
}

fn require_type(input: &Value) -> Result<ContentType, ToolError> {
    let raw = require_str(input, "type")?;
    ContentType::parse(raw).map_err(|e| ToolError::InvalidInput(e.to_string()))
}

fn optional_type(input: &Value) -> Result<Option<ContentType>, ToolError> {
    match input.get("type").and_then(Value::as_str) {
        Some(raw) => ContentType::parse(raw)
            .map(Some)
            .map_err(|e| ToolError::InvalidInput(e.to_string())),
        None => Ok(None),
    }
}

fn to_items_json(items: Vec<folio_content::ContentItem>) -> Result<Value, ToolError> {
    Ok(serde_json::json!({
        "items": serde_json::to_value(items).map_err(internal)?
    }))
}

fn internal(e: serde_json::Error) -> ToolError {
    ToolError::Internal(e.to_string())
}

fn map_content_err(e: ContentError) -> ToolError {
    match e {
        ContentError::NotFound { id } => ToolError::NotFound(id),
        ContentError::VersionNotFound { .. } => ToolError::NotFound(e.to_string()),
        ContentError::SlugConflict { .. } | ContentError::SingletonConflict { .. } => {
            ToolError::Conflict(e.to_string())
        }
        ContentError::Validation(v) => ToolError::Validation(v),
        ContentError::UnknownType { .. } | ContentError::UnknownStatus { .. } => {
            ToolError::InvalidInput(e.to_string())
        }
        other => ToolError::Internal(other.to_string()),
    }
}
