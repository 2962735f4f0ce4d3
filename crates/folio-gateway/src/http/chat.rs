//! Public chat endpoint — POST /api/v1/chat.
//!
//! The route layer derives the salted address hash and hands the rest to the
//! orchestrator; rate limiting, session resolution, PII handling, and the
//! tool loop all live there.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::{Extension, Json};
use folio_chat::{ChatReply, ChatRequest};
use serde::Deserialize;

use crate::app::{err_ctx, AppState};
use crate::auth::hash_client_ip;
use crate::error::{map_chat_error, ApiError};
use crate::request_id::RequestId;

/// Fields default to empty so absence surfaces as a 400 from the
/// orchestrator's validation rather than a deserialization rejection.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub visitor_id: String,
}

/// Wraps `Option<ConnectInfo<SocketAddr>>` as an extractor: axum 0.8 dropped
/// the blanket `FromRequestParts` impl for `Option<T>`, so this reproduces
/// the old "present when served via `into_make_service_with_connect_info`,
/// absent otherwise (e.g. in tests using `oneshot`)" behavior explicitly.
pub(crate) struct MaybeConnectInfo(Option<ConnectInfo<SocketAddr>>);

impl<S> FromRequestParts<S> for MaybeConnectInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<ConnectInfo<SocketAddr>>().copied()))
    }
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    MaybeConnectInfo(connect_info): MaybeConnectInfo,
    headers: HeaderMap,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatReply>, ApiError> {
    let ctx = err_ctx(&state, &request_id);

    let ip = client_ip(&headers, connect_info);
    let ip_hash = hash_client_ip(&state.config.server.ip_salt, &ip);
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let reply = state
        .chat
        .send_message(ChatRequest {
            visitor_id: body.visitor_id,
            ip_hash,
            user_agent,
            message: body.message,
        })
        .await
        .map_err(|e| map_chat_error(e, &ctx))?;

    Ok(Json(reply))
}

/// Client address for rate limiting: first `X-Forwarded-For` hop when a
/// proxy sits in front, otherwise the socket peer.
fn client_ip(headers: &HeaderMap, connect_info: Option<ConnectInfo<SocketAddr>>) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return forwarded.to_string();
    }
    connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
