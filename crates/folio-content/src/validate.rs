//! Type-dispatched validation for the opaque `data` document.
//!
//! Each content kind has a hand-written validator over `serde_json::Value`;
//! failures collect per-field messages keyed by dotted path so the API can
//! return them all at once.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use url::Url;

use crate::types::ContentType;

static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]{1,100}$").unwrap());
static MONTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-(0[1-9]|1[0-2])$").unwrap());
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

const EMPLOYMENT_TYPES: &[&str] = &[
    "full-time",
    "part-time",
    "contract",
    "freelance",
    "internship",
];
const SKILL_CATEGORIES: &[&str] = &[
    "language", "framework", "tool", "platform", "database", "practice",
];
const SKILL_LEVELS: &[&str] = &["beginner", "intermediate", "advanced", "expert"];

/// Validation failure carrying every offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub fields: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    fn single(path: &str, message: &str) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(path.to_string(), vec![message.to_string()]);
        Self { fields }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let summary: Vec<String> = self
            .fields
            .iter()
            .map(|(path, msgs)| format!("{path}: {}", msgs.join("; ")))
            .collect();
        write!(f, "validation failed: {}", summary.join(", "))
    }
}

impl std::error::Error for ValidationError {}

/// Check a slug against `^[a-z0-9-]{1,100}$`.
pub fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    if SLUG_RE.is_match(slug) {
        Ok(())
    } else {
        Err(ValidationError::single(
            "slug",
            "must be 1-100 lowercase alphanumerics or hyphens",
        ))
    }
}

/// Validate `data` for the given content type. Returns the offending fields
/// on failure; the document itself is never mutated.
pub fn validate_content_data(
    content_type: ContentType,
    data: &Value,
) -> Result<(), ValidationError> {
    let mut errors = Fields::new();

    if !data.is_object() {
        return Err(ValidationError::single("data", "must be a JSON object"));
    }

    match content_type {
        ContentType::Project => validate_project(data, &mut errors),
        ContentType::Experience => validate_experience(data, &mut errors),
        ContentType::Education => validate_education(data, &mut errors),
        ContentType::Skill => validate_skill(data, &mut errors),
        ContentType::About => validate_about(data, &mut errors),
        ContentType::Contact => validate_contact(data, &mut errors),
    }

    errors.into_result()
}

fn validate_project(data: &Value, errors: &mut Fields) {
    errors.required_string(data, "title", 200);
    errors.required_string(data, "description", 2000);
    errors.optional_string(data, "content", 20_000);
    errors.optional_string_array(data, "tags", 20, 50);
    errors.optional_url(data, "repo_url");
    errors.optional_url(data, "demo_url");
    errors.optional_url(data, "image_url");
    errors.optional_bool(data, "featured");
}

fn validate_experience(data: &Value, errors: &mut Fields) {
    errors.required_string(data, "company", 200);
    errors.required_string(data, "role", 200);
    errors.optional_enum(data, "employment_type", EMPLOYMENT_TYPES);
    errors.required_month(data, "start_date");
    errors.nullable_month(data, "end_date");
    errors.optional_string(data, "description", 2000);
    errors.optional_string_array(data, "highlights", 20, 500);
}

fn validate_education(data: &Value, errors: &mut Fields) {
    errors.required_string(data, "institution", 200);
    errors.optional_string(data, "degree", 200);
    errors.optional_string(data, "field", 200);
    errors.required_month(data, "start_date");
    errors.nullable_month(data, "end_date");
}

fn validate_skill(data: &Value, errors: &mut Fields) {
    errors.required_string(data, "name", 100);
    errors.required_enum(data, "category", SKILL_CATEGORIES);
    errors.optional_enum(data, "level", SKILL_LEVELS);
    if let Some(years) = data.get("years") {
        match years.as_u64() {
            Some(n) if n <= 60 => {}
            _ => errors.push("years", "must be an integer between 0 and 60"),
        }
    }
}

fn validate_about(data: &Value, errors: &mut Fields) {
    errors.required_string(data, "name", 200);
    errors.optional_string(data, "headline", 300);
    errors.optional_string(data, "summary", 5000);
    errors.optional_string(data, "location", 200);
    errors.optional_url(data, "avatar_url");
}

fn validate_contact(data: &Value, errors: &mut Fields) {
    match data.get("email").and_then(Value::as_str) {
        Some(email) if EMAIL_RE.is_match(email) => {}
        Some(_) => errors.push("email", "must be a valid e-mail address"),
        None => errors.push("email", "is required"),
    }

    if let Some(items) = data.get("items") {
        let Some(items) = items.as_array() else {
            errors.push("items", "must be an array");
            return;
        };
        if items.len() > 20 {
            errors.push("items", "must have at most 20 entries");
        }
        for (i, item) in items.iter().enumerate() {
            match item.get("label").and_then(Value::as_str) {
                Some(label) if label.len() <= 100 => {}
                Some(_) => errors.push(&format!("items.{i}.label"), "must be at most 100 characters"),
                None => errors.push(&format!("items.{i}.label"), "is required"),
            }
            match item.get("url").and_then(Value::as_str) {
                Some(url) if is_http_url(url) => {}
                _ => errors.push(&format!("items.{i}.url"), "must be a valid http(s) URL"),
            }
        }
    }
}

fn is_http_url(s: &str) -> bool {
    Url::parse(s)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Accumulator for per-field messages.
struct Fields {
    map: BTreeMap<String, Vec<String>>,
}

impl Fields {
    fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    fn push(&mut self, path: &str, message: &str) {
        self.map
            .entry(path.to_string())
            .or_default()
            .push(message.to_string());
    }

    fn into_result(self) -> Result<(), ValidationError> {
        if self.map.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { fields: self.map })
        }
    }

    fn required_string(&mut self, data: &Value, path: &str, max: usize) {
        match data.get(path).and_then(Value::as_str) {
            Some(s) if s.is_empty() => self.push(path, "must not be empty"),
            Some(s) if s.chars().count() > max => {
                self.push(path, &format!("must be at most {max} characters"))
            }
            Some(_) => {}
            None => self.push(path, "is required"),
        }
    }

    fn optional_string(&mut self, data: &Value, path: &str, max: usize) {
        match data.get(path) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) if s.chars().count() <= max => {}
            Some(Value::String(_)) => {
                self.push(path, &format!("must be at most {max} characters"))
            }
            Some(_) => self.push(path, "must be a string"),
        }
    }

    fn optional_bool(&mut self, data: &Value, path: &str) {
        match data.get(path) {
            None | Some(Value::Null) | Some(Value::Bool(_)) => {}
            Some(_) => self.push(path, "must be a boolean"),
        }
    }

    fn optional_url(&mut self, data: &Value, path: &str) {
        match data.get(path) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) if is_http_url(s) => {}
            Some(_) => self.push(path, "must be a valid http(s) URL"),
        }
    }

    fn required_enum(&mut self, data: &Value, path: &str, allowed: &[&str]) {
        match data.get(path).and_then(Value::as_str) {
            Some(s) if allowed.contains(&s) => {}
            Some(_) => self.push(path, &format!("must be one of: {}", allowed.join(", "))),
            None => self.push(path, "is required"),
        }
    }

    fn optional_enum(&mut self, data: &Value, path: &str, allowed: &[&str]) {
        match data.get(path) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) if allowed.contains(&s.as_str()) => {}
            Some(_) => self.push(path, &format!("must be one of: {}", allowed.join(", "))),
        }
    }

    fn required_month(&mut self, data: &Value, path: &str) {
        match data.get(path).and_then(Value::as_str) {
            Some(s) if MONTH_RE.is_match(s) => {}
            Some(_) => self.push(path, "must match YYYY-MM"),
            None => self.push(path, "is required"),
        }
    }

    /// `null` means "current" and is accepted.
    fn nullable_month(&mut self, data: &Value, path: &str) {
        match data.get(path) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) if MONTH_RE.is_match(s) => {}
            Some(_) => self.push(path, "must match YYYY-MM or be null"),
        }
    }

    fn optional_string_array(&mut self, data: &Value, path: &str, max_items: usize, max_len: usize) {
        match data.get(path) {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                if items.len() > max_items {
                    self.push(path, &format!("must have at most {max_items} entries"));
                }
                for (i, item) in items.iter().enumerate() {
                    match item.as_str() {
                        Some(s) if s.chars().count() <= max_len => {}
                        Some(_) => self.push(
                            &format!("{path}.{i}"),
                            &format!("must be at most {max_len} characters"),
                        ),
                        None => self.push(&format!("{path}.{i}"), "must be a string"),
                    }
                }
            }
            Some(_) => self.push(path, "must be an array"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn slug_shape() {
        assert!(validate_slug("my-project-1").is_ok());
        assert!(validate_slug("").is_err());
        assert!(validate_slug("Has Caps").is_err());
        assert!(validate_slug(&"a".repeat(101)).is_err());
        assert!(validate_slug(&"a".repeat(100)).is_ok());
    }

    #[test]
    fn valid_project_passes() {
        let data = json!({
            "title": "Folio",
            "description": "A portfolio backend",
            "tags": ["rust", "axum"],
            "repo_url": "https://example.com/repo",
            "featured": true
        });
        assert!(validate_content_data(ContentType::Project, &data).is_ok());
    }

    #[test]
    fn project_missing_title_reports_field() {
        let data = json!({"description": "D"});
        let err = validate_content_data(ContentType::Project, &data).unwrap_err();
        assert_eq!(err.fields["title"], vec!["is required"]);
    }

    #[test]
    fn project_bad_url_reports_field() {
        let data = json!({"title": "T", "description": "D", "repo_url": "not a url"});
        let err = validate_content_data(ContentType::Project, &data).unwrap_err();
        assert!(err.fields.contains_key("repo_url"));
    }

    #[test]
    fn project_too_many_tags() {
        let tags: Vec<String> = (0..21).map(|i| format!("t{i}")).collect();
        let data = json!({"title": "T", "description": "D", "tags": tags});
        let err = validate_content_data(ContentType::Project, &data).unwrap_err();
        assert!(err.fields.contains_key("tags"));
    }

    #[test]
    fn experience_dates() {
        let ok = json!({
            "company": "Acme",
            "role": "Engineer",
            "employment_type": "full-time",
            "start_date": "2023-04",
            "end_date": null
        });
        assert!(validate_content_data(ContentType::Experience, &ok).is_ok());

        let bad = json!({
            "company": "Acme",
            "role": "Engineer",
            "start_date": "2023-13"
        });
        let err = validate_content_data(ContentType::Experience, &bad).unwrap_err();
        assert!(err.fields.contains_key("start_date"));
    }

    #[test]
    fn experience_bad_employment_type() {
        let data = json!({
            "company": "Acme",
            "role": "Engineer",
            "employment_type": "gig",
            "start_date": "2023-04"
        });
        let err = validate_content_data(ContentType::Experience, &data).unwrap_err();
        assert!(err.fields.contains_key("employment_type"));
    }

    #[test]
    fn skill_category_enum() {
        let ok = json!({"name": "Rust", "category": "language", "level": "expert"});
        assert!(validate_content_data(ContentType::Skill, &ok).is_ok());

        let bad = json!({"name": "Rust", "category": "hobby"});
        let err = validate_content_data(ContentType::Skill, &bad).unwrap_err();
        assert!(err.fields.contains_key("category"));
    }

    #[test]
    fn skill_years_bounds() {
        let bad = json!({"name": "Rust", "category": "language", "years": 99});
        let err = validate_content_data(ContentType::Skill, &bad).unwrap_err();
        assert!(err.fields.contains_key("years"));
    }

    #[test]
    fn contact_requires_valid_email() {
        let bad = json!({"email": "not-an-email"});
        let err = validate_content_data(ContentType::Contact, &bad).unwrap_err();
        assert!(err.fields.contains_key("email"));

        let ok = json!({
            "email": "hi@example.com",
            "items": [{"label": "GitHub", "url": "https://github.com/someone"}]
        });
        assert!(validate_content_data(ContentType::Contact, &ok).is_ok());
    }

    #[test]
    fn contact_item_errors_use_dotted_paths() {
        let data = json!({
            "email": "hi@example.com",
            "items": [{"url": "ftp://x"}]
        });
        let err = validate_content_data(ContentType::Contact, &data).unwrap_err();
        assert!(err.fields.contains_key("items.0.label"));
        assert!(err.fields.contains_key("items.0.url"));
    }

    #[test]
    fn non_object_data_rejected() {
        let err = validate_content_data(ContentType::Project, &json!("text")).unwrap_err();
        assert!(err.fields.contains_key("data"));
    }

    #[test]
    fn multiple_errors_collected_at_once() {
        let data = json!({"title": "", "repo_url": 7});
        let err = validate_content_data(ContentType::Project, &data).unwrap_err();
        assert!(err.fields.len() >= 3); // title, description, repo_url
    }
}
