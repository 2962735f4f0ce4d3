//! Read-only `portfolio://` resources over published content.

use folio_content::{ContentRepository, ContentType};
use serde_json::{json, Value};

use crate::server::McpError;

const SCHEME: &str = "portfolio://";

/// Static resource catalog: the full collection plus one entry per type.
pub fn list_resources() -> Vec<Value> {
    let mut resources = vec![json!({
        "uri": "portfolio://content",
        "name": "All published content",
        "description": "Every published portfolio item, partitioned by type.",
        "mimeType": "application/json"
    })];
    for t in ContentType::ALL {
        resources.push(json!({
            "uri": format!("portfolio://content/{t}"),
            "name": format!("Published {t} items"),
            "description": format!("Published items of type '{t}'. Append /{{slug}} for a single item."),
            "mimeType": "application/json"
        }));
    }
    resources
}

/// Resolve a `portfolio://content[/{type}[/{slug}]]` URI to a contents entry.
pub fn read_resource(repo: &ContentRepository, uri: &str) -> Result<Value, McpError> {
    let path = uri
        .strip_prefix(SCHEME)
        .ok_or_else(|| McpError::InvalidParams(format!("unsupported URI scheme: {uri}")))?;
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let text = match segments.as_slice() {
        ["content"] => {
            let bundle = repo
                .get_bundle()
                .map_err(|e| McpError::Internal(e.to_string()))?;
            serde_json::to_string(&bundle).map_err(|e| McpError::Internal(e.to_string()))?
        }
        ["content", type_str] => {
            let content_type = parse_type(type_str)?;
            let items = repo
                .find_published(Some(content_type))
                .map_err(|e| McpError::Internal(e.to_string()))?;
            serde_json::to_string(&items).map_err(|e| McpError::Internal(e.to_string()))?
        }
        ["content", type_str, slug] => {
            let content_type = parse_type(type_str)?;
            let item = repo
                .find_by_slug(content_type, slug)
                .map_err(|e| McpError::Internal(e.to_string()))?
                .filter(|item| item.status == folio_content::ContentStatus::Published)
                .ok_or_else(|| McpError::ResourceNotFound(uri.to_string()))?;
            serde_json::to_string(&item).map_err(|e| McpError::Internal(e.to_string()))?
        }
        _ => {
            return Err(McpError::InvalidParams(format!(
                "unrecognised resource URI: {uri}"
            )))
        }
    };

    Ok(json!({
        "uri": uri,
        "mimeType": "application/json",
        "text": text
    }))
}

fn parse_type(s: &str) -> Result<ContentType, McpError> {
    ContentType::parse(s).map_err(|e| McpError::InvalidParams(e.to_string()))
}
