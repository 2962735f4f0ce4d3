//! MCP streamable HTTP transport.
//!
//! One axum sub-router handles three verbs: POST carries JSON-RPC requests,
//! GET opens a server-sent-events stream for server-initiated notifications,
//! DELETE tears a session down. Sessions are keyed by the `mcp-session-id`
//! header; an `initialize` POST without the header allocates one. A reaper
//! task evicts sessions idle longer than 30 minutes.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use dashmap::DashMap;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info};
use uuid::Uuid;

use crate::server::{err_response, McpServer, INVALID_REQUEST, PARSE_ERROR};

pub const SESSION_HEADER: &str = "mcp-session-id";

/// Sessions idle longer than this are reaped.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const REAP_INTERVAL: Duration = Duration::from_secs(60);
/// Buffered server-initiated notifications per session.
const NOTIFY_CAPACITY: usize = 64;

struct HttpSession {
    last_accessed: Instant,
    notifications: broadcast::Sender<String>,
}

impl HttpSession {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            last_accessed: Instant::now(),
            notifications: tx,
        }
    }
}

pub struct McpHttpState {
    server: McpServer,
    sessions: DashMap<String, HttpSession>,
}

impl McpHttpState {
    pub fn new(server: McpServer) -> Arc<Self> {
        Arc::new(Self {
            server,
            sessions: DashMap::new(),
        })
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Refresh a session's idle clock. Returns false for unknown sessions.
    fn touch(&self, session_id: &str) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(mut session) => {
                session.last_accessed = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Evict sessions idle beyond [`IDLE_TIMEOUT`]. Returns how many went.
    pub fn reap_idle(&self) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.last_accessed.elapsed() < IDLE_TIMEOUT);
        let reaped = before - self.sessions.len();
        if reaped > 0 {
            info!(reaped, remaining = self.sessions.len(), "reaped idle mcp sessions");
        }
        reaped
    }
}

/// Build the MCP sub-router and start its reaper. Mount under `/mcp`.
pub fn router(state: Arc<McpHttpState>) -> Router {
    let reaper_state = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(REAP_INTERVAL);
        loop {
            ticker.tick().await;
            reaper_state.reap_idle();
        }
    });

    Router::new()
        .route("/", post(handle_post).get(handle_sse).delete(handle_delete))
        .with_state(state)
}

async fn handle_post(
    State(state): State<Arc<McpHttpState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let request: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(e) => {
            return Json(err_response(
                json!(null),
                PARSE_ERROR,
                &format!("Parse error: {e}"),
            ))
            .into_response()
        }
    };

    let session_header = session_id(&headers);
    let is_initialize = request.get("method").and_then(Value::as_str) == Some("initialize");

    // An initialize without a session header allocates a new session and
    // echoes its id back; everything else must reference an existing one.
    if is_initialize && session_header.is_none() {
        let new_id = Uuid::new_v4().to_string();
        state.sessions.insert(new_id.clone(), HttpSession::new());
        debug!(session_id = %new_id, "mcp http session created");

        let response = state.server.handle(&request).await.unwrap_or(json!(null));
        return ([(SESSION_HEADER, new_id)], Json(response)).into_response();
    }

    let Some(session_id) = session_header else {
        return (
            StatusCode::BAD_REQUEST,
            Json(err_response(
                json!(null),
                INVALID_REQUEST,
                "Invalid request: missing mcp-session-id header",
            )),
        )
            .into_response();
    };
    if !state.touch(&session_id) {
        return (
            StatusCode::NOT_FOUND,
            Json(err_response(
                json!(null),
                INVALID_REQUEST,
                "Invalid request: unknown mcp-session-id",
            )),
        )
            .into_response();
    }

    match state.server.handle(&request).await {
        Some(response) => Json(response).into_response(),
        // Notifications get no body.
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn handle_sse(
    State(state): State<Arc<McpHttpState>>,
    headers: HeaderMap,
) -> Response {
    let Some(session_id) = session_id(&headers) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Some(session) = state.sessions.get(&session_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let rx = session.notifications.subscribe();
    drop(session);
    state.touch(&session_id);

    let stream = BroadcastStream::new(rx)
        .filter_map(|message| async move { message.ok() })
        .map(|message| Ok::<_, Infallible>(SseEvent::default().data(message)));

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn handle_delete(
    State(state): State<Arc<McpHttpState>>,
    headers: HeaderMap,
) -> Response {
    let Some(session_id) = session_id(&headers) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    match state.sessions.remove(&session_id) {
        Some(_) => {
            debug!(session_id = %session_id, "mcp http session deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use folio_content::ContentRepository;
    use folio_core::events::EventBus;
    use rusqlite::Connection;
    use tower::ServiceExt;

    fn test_state() -> Arc<McpHttpState> {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        folio_content::db::init_db(&conn).unwrap();
        let repo = Arc::new(ContentRepository::new(conn, Arc::new(EventBus::new())));
        McpHttpState::new(McpServer::new(repo))
    }

    fn rpc(method: &str) -> String {
        json!({"jsonrpc": "2.0", "id": 1, "method": method}).to_string()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn initialize_allocates_session_and_echoes_header() {
        let state = test_state();
        let app = router(state.clone());

        let response = app
            .oneshot(
                Request::post("/")
                    .header("content-type", "application/json")
                    .body(Body::from(rpc("initialize")))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(SESSION_HEADER));
        assert_eq!(state.session_count(), 1);

        let body = body_json(response).await;
        assert_eq!(body["result"]["serverInfo"]["name"], "folio");
    }

    #[tokio::test]
    async fn non_initialize_requires_session_header() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::post("/")
                    .body(Body::from(rpc("tools/list")))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::post("/")
                    .header(SESSION_HEADER, "nope")
                    .body(Body::from(rpc("tools/list")))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn established_session_serves_tools_list() {
        let state = test_state();

        let response = router(state.clone())
            .oneshot(
                Request::post("/")
                    .body(Body::from(rpc("initialize")))
                    .unwrap(),
            )
            .await
            .unwrap();
        let session = response.headers()[SESSION_HEADER].to_str().unwrap().to_string();

        let response = router(state)
            .oneshot(
                Request::post("/")
                    .header(SESSION_HEADER, session)
                    .body(Body::from(rpc("tools/list")))
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["result"]["tools"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn delete_tears_down_session() {
        let state = test_state();

        let response = router(state.clone())
            .oneshot(
                Request::post("/")
                    .body(Body::from(rpc("initialize")))
                    .unwrap(),
            )
            .await
            .unwrap();
        let session = response.headers()[SESSION_HEADER].to_str().unwrap().to_string();

        let response = router(state.clone())
            .oneshot(
                Request::delete("/")
                    .header(SESSION_HEADER, session.clone())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(state.session_count(), 0);

        let response = router(state)
            .oneshot(
                Request::post("/")
                    .header(SESSION_HEADER, session)
                    .body(Body::from(rpc("tools/list")))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn reaper_evicts_only_idle_sessions() {
        let state = test_state();
        state.sessions.insert(
            "stale".to_string(),
            HttpSession {
                last_accessed: Instant::now() - (IDLE_TIMEOUT + Duration::from_secs(1)),
                notifications: broadcast::channel(1).0,
            },
        );
        state.sessions.insert("fresh".to_string(), HttpSession::new());

        assert_eq!(state.reap_idle(), 1);
        assert!(state.sessions.get("fresh").is_some());
        assert!(state.sessions.get("stale").is_none());
    }
}
