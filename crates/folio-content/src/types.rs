use serde::{Deserialize, Serialize};

use crate::error::{ContentError, Result};

/// The six addressable content kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Project,
    Experience,
    Education,
    Skill,
    About,
    Contact,
}

impl ContentType {
    pub const ALL: [ContentType; 6] = [
        ContentType::Project,
        ContentType::Experience,
        ContentType::Education,
        ContentType::Skill,
        ContentType::About,
        ContentType::Contact,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Project => "project",
            ContentType::Experience => "experience",
            ContentType::Education => "education",
            ContentType::Skill => "skill",
            ContentType::About => "about",
            ContentType::Contact => "contact",
        }
    }

    /// Singleton kinds hold at most one live row; the bundle exposes them as
    /// a single value.
    pub fn is_singleton(&self) -> bool {
        matches!(self, ContentType::About | ContentType::Contact)
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "project" => Ok(ContentType::Project),
            "experience" => Ok(ContentType::Experience),
            "education" => Ok(ContentType::Education),
            "skill" => Ok(ContentType::Skill),
            "about" => Ok(ContentType::About),
            "contact" => Ok(ContentType::Contact),
            other => Err(ContentError::UnknownType {
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Draft,
    Published,
    Archived,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::Published => "published",
            ContentStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(ContentStatus::Draft),
            "published" => Ok(ContentStatus::Published),
            "archived" => Ok(ContentStatus::Archived),
            other => Err(ContentError::UnknownStatus {
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a history snapshot was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
    Restored,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Created => "created",
            ChangeType::Updated => "updated",
            ChangeType::Deleted => "deleted",
            ChangeType::Restored => "restored",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One addressable portfolio record. `data` is an opaque JSON document whose
/// shape is dictated by `content_type` and enforced by the validation layer,
/// never by the repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub slug: String,
    pub data: serde_json::Value,
    pub status: ContentStatus,
    pub version: i64,
    pub sort_order: i64,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

/// Append-only snapshot of an item at one version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: i64,
    pub content_id: String,
    pub version: i64,
    pub data: serde_json::Value,
    pub change_type: ChangeType,
    pub changed_by: Option<String>,
    pub change_summary: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContent {
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub slug: String,
    pub data: serde_json::Value,
    #[serde(default)]
    pub status: Option<ContentStatus>,
    #[serde(default)]
    pub sort_order: Option<i64>,
}

/// Selective update — absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContent {
    pub slug: Option<String>,
    pub data: Option<serde_json::Value>,
    pub status: Option<ContentStatus>,
    pub sort_order: Option<i64>,
}

impl UpdateContent {
    pub fn is_empty(&self) -> bool {
        self.slug.is_none()
            && self.data.is_none()
            && self.status.is_none()
            && self.sort_order.is_none()
    }
}

/// Admin listing filter. Construct through [`ListQuery::clamped`] so limit
/// and offset stay inside their bounds.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub content_type: Option<ContentType>,
    pub status: Option<ContentStatus>,
    pub include_deleted: bool,
    pub limit: i64,
    pub offset: i64,
}

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 100;

impl ListQuery {
    pub fn clamped(
        content_type: Option<ContentType>,
        status: Option<ContentStatus>,
        include_deleted: bool,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Self {
        Self {
            content_type,
            status,
            include_deleted,
            limit: limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

/// Published content partitioned by type. Singleton kinds collapse to one
/// value; write-time enforcement guarantees at most one exists.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub projects: Vec<ContentItem>,
    pub experiences: Vec<ContentItem>,
    pub education: Vec<ContentItem>,
    pub skills: Vec<ContentItem>,
    pub about: Option<ContentItem>,
    pub contact: Option<ContentItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_round_trip() {
        for t in ContentType::ALL {
            assert_eq!(ContentType::parse(t.as_str()).unwrap(), t);
        }
        assert!(ContentType::parse("blog").is_err());
    }

    #[test]
    fn singleton_kinds() {
        assert!(ContentType::About.is_singleton());
        assert!(ContentType::Contact.is_singleton());
        assert!(!ContentType::Project.is_singleton());
    }

    #[test]
    fn list_query_clamps_bounds() {
        let q = ListQuery::clamped(None, None, false, Some(500), Some(-3));
        assert_eq!(q.limit, MAX_LIST_LIMIT);
        assert_eq!(q.offset, 0);

        let q = ListQuery::clamped(None, None, false, None, None);
        assert_eq!(q.limit, DEFAULT_LIST_LIMIT);
    }

    #[test]
    fn item_serializes_with_wire_field_names() {
        let item = ContentItem {
            id: "content_x".to_string(),
            content_type: ContentType::Project,
            slug: "x".to_string(),
            data: serde_json::json!({"title": "T"}),
            status: ContentStatus::Draft,
            version: 1,
            sort_order: 0,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            deleted_at: None,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "project");
        assert_eq!(json["sortOrder"], 0);
        assert!(json["createdAt"].is_string());
    }
}
