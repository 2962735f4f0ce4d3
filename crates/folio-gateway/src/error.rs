//! The single HTTP error envelope: `{error: {code, message, requestId,
//! fields?, retryAfter?}}`, with error kinds mapped onto status codes in one
//! place.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use folio_chat::ChatError;
use folio_content::ContentError;
use folio_llm::LlmError;
use serde_json::json;
use tracing::{error, warn};

/// Per-request error context: the request id echoed into every envelope, and
/// whether internal messages must be scrubbed (production).
#[derive(Debug, Clone)]
pub struct ErrCtx {
    pub request_id: String,
    pub production: bool,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub request_id: String,
    pub fields: Option<BTreeMap<String, Vec<String>>>,
    pub retry_after: Option<u64>,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>, ctx: &ErrCtx) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            request_id: ctx.request_id.clone(),
            fields: None,
            retry_after: None,
        }
    }

    pub fn validation(message: impl Into<String>, ctx: &ErrCtx) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message, ctx)
    }

    pub fn validation_fields(fields: BTreeMap<String, Vec<String>>, ctx: &ErrCtx) -> Self {
        let mut err = Self::validation("Validation failed", ctx);
        err.fields = Some(fields);
        err
    }

    pub fn not_found(what: impl Into<String>, ctx: &ErrCtx) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{} not found", what.into()),
            ctx,
        )
    }

    pub fn unauthorized(ctx: &ErrCtx) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "Invalid or missing admin key",
            ctx,
        )
    }

    pub fn conflict(message: impl Into<String>, ctx: &ErrCtx) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message, ctx)
    }

    pub fn rate_limited(retry_after_secs: u64, ctx: &ErrCtx) -> Self {
        let mut err = Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMIT_EXCEEDED",
            "Too many requests",
            ctx,
        );
        err.retry_after = Some(retry_after_secs);
        err
    }

    pub fn upstream(message: impl Into<String>, ctx: &ErrCtx) -> Self {
        Self::new(
            StatusCode::BAD_GATEWAY,
            "UPSTREAM_UNAVAILABLE",
            message,
            ctx,
        )
    }

    pub fn internal(message: impl Into<String>, ctx: &ErrCtx) -> Self {
        let message = message.into();
        error!(request_id = %ctx.request_id, message, "internal error");
        let visible = if ctx.production {
            "An unexpected error occurred".to_string()
        } else {
            message
        };
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", visible, ctx)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_client_error() {
            warn!(
                request_id = %self.request_id,
                code = self.code,
                status = self.status.as_u16(),
                "request failed"
            );
        }

        let mut body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
                "requestId": self.request_id,
            }
        });
        if let Some(fields) = &self.fields {
            body["error"]["fields"] = json!(fields);
        }
        if let Some(retry_after) = self.retry_after {
            body["error"]["retryAfter"] = json!(retry_after);
        }

        let mut response = (self.status, Json(body)).into_response();
        if let Some(retry_after) = self.retry_after {
            if let Ok(value) = retry_after.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}

/// Map repository errors onto the envelope.
pub fn map_content_error(e: ContentError, ctx: &ErrCtx) -> ApiError {
    match e {
        ContentError::NotFound { id } => ApiError::not_found(format!("content {id}"), ctx),
        ContentError::VersionNotFound { id, version } => {
            ApiError::not_found(format!("version {version} of {id}"), ctx)
        }
        ContentError::SlugConflict { .. } | ContentError::SingletonConflict { .. } => {
            ApiError::conflict(e.to_string(), ctx)
        }
        ContentError::Validation(v) => ApiError::validation_fields(v.fields, ctx),
        ContentError::UnknownType { .. } | ContentError::UnknownStatus { .. } => {
            ApiError::validation(e.to_string(), ctx)
        }
        other => ApiError::internal(other.to_string(), ctx),
    }
}

/// Map chat pipeline errors onto the envelope.
pub fn map_chat_error(e: ChatError, ctx: &ErrCtx) -> ApiError {
    match e {
        ChatError::InvalidRequest(message) => ApiError::validation(message, ctx),
        ChatError::RateLimited { retry_after_secs } => {
            ApiError::rate_limited(retry_after_secs, ctx)
        }
        ChatError::SessionNotFound { id } => ApiError::not_found(format!("session {id}"), ctx),
        ChatError::Llm(llm) => map_llm_error(llm, ctx),
        other => ApiError::internal(other.to_string(), ctx),
    }
}

fn map_llm_error(e: LlmError, ctx: &ErrCtx) -> ApiError {
    match &e {
        LlmError::CircuitOpen { provider } => {
            ApiError::upstream(format!("LLM provider '{provider}' is unavailable"), ctx)
        }
        _ => ApiError::upstream(format!("LLM request failed: {e}"), ctx),
    }
}
