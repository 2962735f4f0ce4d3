//! Public content endpoints. Published items only; responses carry an ETag
//! and a short `Cache-Control` so repeat polls answer 304.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use folio_content::{ContentStatus, ContentType};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::app::{err_ctx, AppState};
use crate::error::{map_content_error, ApiError};
use crate::request_id::RequestId;

const LIST_MAX_AGE_SECS: u32 = 60;
const BUNDLE_MAX_AGE_SECS: u32 = 300;

#[derive(Deserialize)]
pub struct ListParams {
    #[serde(rename = "type")]
    content_type: Option<String>,
}

/// GET /api/v1/content?type=
pub async fn list_published(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    let ctx = err_ctx(&state, &request_id);

    let content_type = match params.content_type.as_deref() {
        Some(raw) => Some(
            ContentType::parse(raw).map_err(|e| ApiError::validation(e.to_string(), &ctx))?,
        ),
        None => None,
    };

    let items = state
        .repo
        .find_published(content_type)
        .map_err(|e| map_content_error(e, &ctx))?;
    let body = serde_json::to_string(&serde_json::json!({ "items": items }))
        .map_err(|e| ApiError::internal(e.to_string(), &ctx))?;
    Ok(cached_json(&headers, body, LIST_MAX_AGE_SECS))
}

/// GET /api/v1/content/bundle
pub async fn bundle(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let ctx = err_ctx(&state, &request_id);

    let bundle = state
        .repo
        .get_bundle()
        .map_err(|e| map_content_error(e, &ctx))?;
    let body = serde_json::to_string(&bundle)
        .map_err(|e| ApiError::internal(e.to_string(), &ctx))?;
    Ok(cached_json(&headers, body, BUNDLE_MAX_AGE_SECS))
}

/// GET /api/v1/content/{type}/{slug} — 404 for anything not published.
pub async fn get_by_slug(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path((type_str, slug)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let ctx = err_ctx(&state, &request_id);

    let content_type = ContentType::parse(&type_str)
        .map_err(|e| ApiError::validation(e.to_string(), &ctx))?;
    let item = state
        .repo
        .find_by_slug(content_type, &slug)
        .map_err(|e| map_content_error(e, &ctx))?
        .filter(|item| item.status == ContentStatus::Published)
        .ok_or_else(|| ApiError::not_found(format!("{type_str}/{slug}"), &ctx))?;

    Ok(axum::Json(item).into_response())
}

/// JSON response with a strong ETag; `If-None-Match` hits answer 304.
fn cached_json(request_headers: &HeaderMap, body: String, max_age_secs: u32) -> Response {
    let etag = format!("\"{}\"", hex::encode(Sha256::digest(body.as_bytes())));

    let revalidated = request_headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == etag);
    if revalidated {
        return (
            StatusCode::NOT_MODIFIED,
            [
                (header::ETAG, etag),
                (
                    header::CACHE_CONTROL,
                    format!("public, max-age={max_age_secs}"),
                ),
            ],
        )
            .into_response();
    }

    (
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::ETAG, etag),
            (
                header::CACHE_CONTROL,
                format!("public, max-age={max_age_secs}"),
            ),
        ],
        body,
    )
        .into_response()
}
