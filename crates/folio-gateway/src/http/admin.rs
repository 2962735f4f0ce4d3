//! Admin content endpoints, behind the `X-Admin-Key` shared secret.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use folio_content::{
    validate_content_data, ContentStatus, ContentType, CreateContent, ListQuery, UpdateContent,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::app::{err_ctx, AppState};
use crate::auth::require_admin;
use crate::error::{map_content_error, ApiError, ErrCtx};
use crate::request_id::RequestId;

/// Writes through the admin surface are attributed to this identity.
const CHANGED_BY: &str = "admin";

const IDEMPOTENCY_HEADER: &str = "idempotency-key";
/// Replay window for idempotent creates.
const IDEMPOTENCY_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Deserialize)]
pub struct AdminListParams {
    #[serde(rename = "type")]
    content_type: Option<String>,
    status: Option<String>,
    #[serde(rename = "includeDeleted")]
    include_deleted: Option<bool>,
    limit: Option<i64>,
    offset: Option<i64>,
}

/// GET /api/v1/admin/content
pub async fn list_content(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Query(params): Query<AdminListParams>,
) -> Result<Json<Value>, ApiError> {
    let ctx = err_ctx(&state, &request_id);
    require_admin(&state, &headers, &ctx)?;

    let content_type = parse_optional_type(params.content_type.as_deref(), &ctx)?;
    let status = match params.status.as_deref() {
        Some(raw) => Some(
            ContentStatus::parse(raw).map_err(|e| ApiError::validation(e.to_string(), &ctx))?,
        ),
        None => None,
    };

    let query = ListQuery::clamped(
        content_type,
        status,
        params.include_deleted.unwrap_or(false),
        params.limit,
        params.offset,
    );
    let items = state
        .repo
        .find_all(&query)
        .map_err(|e| map_content_error(e, &ctx))?;
    Ok(Json(serde_json::json!({
        "items": items,
        "limit": query.limit,
        "offset": query.offset,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBody {
    #[serde(rename = "type")]
    content_type: String,
    slug: Option<String>,
    data: Value,
    status: Option<String>,
    sort_order: Option<i64>,
}

/// POST /api/v1/admin/content — honors `Idempotency-Key`: a repeated create
/// with the same key replays the first response instead of conflicting.
pub async fn create_content(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Json(body): Json<CreateBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let ctx = err_ctx(&state, &request_id);
    require_admin(&state, &headers, &ctx)?;

    let idempotency_key = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|k| format!("idempotency:{k}"));
    if let Some(key) = &idempotency_key {
        match state.cache.get(key).await {
            Ok(Some(cached)) => {
                if let Ok(item) = serde_json::from_str::<Value>(&cached) {
                    return Ok((StatusCode::CREATED, Json(item)));
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "idempotency cache read failed; proceeding"),
        }
    }

    let content_type = parse_type(&body.content_type, &ctx)?;
    validate_content_data(content_type, &body.data)
        .map_err(|e| ApiError::validation_fields(e.fields, &ctx))?;

    let slug = match body.slug {
        Some(slug) => slug,
        None => folio_tools::content_tools::derive_slug(&body.data).ok_or_else(|| {
            ApiError::validation(
                "no slug given and data has no title or name to derive one from",
                &ctx,
            )
        })?,
    };
    let status = parse_optional_status(body.status.as_deref(), &ctx)?;

    let item = state
        .repo
        .create(
            CreateContent {
                content_type,
                slug,
                data: body.data,
                status,
                sort_order: body.sort_order,
            },
            Some(CHANGED_BY),
        )
        .map_err(|e| map_content_error(e, &ctx))?;

    let payload = serde_json::to_value(&item).map_err(|e| ApiError::internal(e.to_string(), &ctx))?;
    if let Some(key) = &idempotency_key {
        if let Err(e) = state
            .cache
            .set(key, &payload.to_string(), Some(IDEMPOTENCY_TTL_SECS))
            .await
        {
            warn!(error = %e, "idempotency cache write failed");
        }
    }
    Ok((StatusCode::CREATED, Json(payload)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBody {
    slug: Option<String>,
    data: Option<Value>,
    status: Option<String>,
    sort_order: Option<i64>,
}

/// PUT /api/v1/admin/content/{id}
pub async fn update_content(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateBody>,
) -> Result<Json<Value>, ApiError> {
    let ctx = err_ctx(&state, &request_id);
    require_admin(&state, &headers, &ctx)?;

    let existing = state
        .repo
        .find_by_id(&id)
        .map_err(|e| map_content_error(e, &ctx))?
        .ok_or_else(|| ApiError::not_found(format!("content {id}"), &ctx))?;

    if let Some(ref data) = body.data {
        validate_content_data(existing.content_type, data)
            .map_err(|e| ApiError::validation_fields(e.fields, &ctx))?;
    }
    let status = parse_optional_status(body.status.as_deref(), &ctx)?;

    let item = state
        .repo
        .update_with_history(
            &id,
            UpdateContent {
                slug: body.slug,
                data: body.data,
                status,
                sort_order: body.sort_order,
            },
            Some(CHANGED_BY),
        )
        .map_err(|e| map_content_error(e, &ctx))?;
    Ok(Json(
        serde_json::to_value(item).map_err(|e| ApiError::internal(e.to_string(), &ctx))?,
    ))
}

#[derive(Deserialize)]
pub struct DeleteParams {
    hard: Option<bool>,
}

/// DELETE /api/v1/admin/content/{id}?hard=
pub async fn delete_content(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<Value>, ApiError> {
    let ctx = err_ctx(&state, &request_id);
    require_admin(&state, &headers, &ctx)?;

    let hard = params.hard.unwrap_or(false);
    if hard {
        state
            .repo
            .hard_delete(&id)
            .map_err(|e| map_content_error(e, &ctx))?;
    } else {
        state
            .repo
            .delete(&id, Some(CHANGED_BY))
            .map_err(|e| map_content_error(e, &ctx))?;
    }
    Ok(Json(serde_json::json!({
        "deleted": true,
        "id": id,
        "hard": hard,
    })))
}

#[derive(Deserialize)]
pub struct HistoryParams {
    limit: Option<i64>,
    offset: Option<i64>,
}

/// GET /api/v1/admin/content/{id}/history — descending by version.
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Value>, ApiError> {
    let ctx = err_ctx(&state, &request_id);
    require_admin(&state, &headers, &ctx)?;

    let limit = params.limit.unwrap_or(50).clamp(1, 100);
    let offset = params.offset.unwrap_or(0).max(0);
    let entries = state
        .repo
        .get_history(&id, limit, offset)
        .map_err(|e| map_content_error(e, &ctx))?;
    Ok(Json(serde_json::json!({
        "items": entries,
        "limit": limit,
        "offset": offset,
    })))
}

#[derive(Deserialize)]
pub struct RestoreBody {
    version: i64,
}

/// POST /api/v1/admin/content/{id}/restore
pub async fn restore_version(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RestoreBody>,
) -> Result<Json<Value>, ApiError> {
    let ctx = err_ctx(&state, &request_id);
    require_admin(&state, &headers, &ctx)?;

    let item = state
        .repo
        .restore_version(&id, body.version, Some(CHANGED_BY))
        .map_err(|e| map_content_error(e, &ctx))?;
    Ok(Json(
        serde_json::to_value(item).map_err(|e| ApiError::internal(e.to_string(), &ctx))?,
    ))
}

fn parse_type(raw: &str, ctx: &ErrCtx) -> Result<ContentType, ApiError> {
    ContentType::parse(raw).map_err(|e| ApiError::validation(e.to_string(), ctx))
}

fn parse_optional_type(raw: Option<&str>, ctx: &ErrCtx) -> Result<Option<ContentType>, ApiError> {
    raw.map(|r| parse_type(r, ctx)).transpose()
}

fn parse_optional_status(
    raw: Option<&str>,
    ctx: &ErrCtx,
) -> Result<Option<ContentStatus>, ApiError> {
    raw.map(|r| {
        ContentStatus::parse(r).map_err(|e| ApiError::validation(e.to_string(), ctx))
    })
    .transpose()
}
