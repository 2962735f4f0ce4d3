//! End-to-end scenarios against the assembled router: admin CRUD with
//! history and restore, published-only masking, caching headers, auth, and
//! request-id propagation.

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use folio_core::config::{
    AdminConfig, CacheConfig, ChatConfig, DatabaseConfig, FolioConfig, LimiterConfig, LlmConfig,
    ServerConfig,
};
use folio_gateway::app::{build_router, AppState};
use folio_mcp::{McpHttpState, McpServer};
use serde_json::{json, Value};
use tower::ServiceExt;

const ADMIN_KEY: &str = "test-admin-key-0123456789abcdef!";

fn test_config() -> FolioConfig {
    FolioConfig {
        server: ServerConfig::default(),
        admin: AdminConfig {
            api_key: ADMIN_KEY.to_string(),
        },
        database: DatabaseConfig {
            path: ":memory:".to_string(),
        },
        cache: CacheConfig::default(),
        llm: LlmConfig {
            provider: "openai".to_string(),
            api_key: "test-key".to_string(),
            base_url: "http://localhost:1".to_string(),
            model: "test-model".to_string(),
            max_tokens: 64,
            temperature: 0.0,
            timeout_ms: 1000,
            max_retries: 0,
        },
        limiter: LimiterConfig::default(),
        chat: ChatConfig::default(),
    }
}

fn test_app() -> Router {
    let state = AppState::from_config(test_config()).unwrap();
    let mcp = folio_mcp::router(McpHttpState::new(McpServer::new(state.repo.clone())));
    build_router(state, mcp)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    admin: bool,
    extra_headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if admin {
        builder = builder.header("x-admin-key", ADMIN_KEY);
    }
    for (name, value) in extra_headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, headers, body)
}

fn project_body(slug: &str) -> Value {
    json!({
        "type": "project",
        "slug": slug,
        "data": {"title": "T", "description": "D"}
    })
}

#[tokio::test]
async fn create_read_publish_lifecycle() {
    let app = test_app();

    // Create: 201, version 1, draft.
    let (status, _, created) = send(
        &app,
        Method::POST,
        "/api/v1/admin/content",
        true,
        &[],
        Some(project_body("x")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["version"], 1);
    assert_eq!(created["status"], "draft");
    let id = created["id"].as_str().unwrap().to_string();

    // Draft is masked from the public surface.
    let (status, _, _) = send(&app, Method::GET, "/api/v1/content/project/x", false, &[], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Publish: version 2.
    let (status, _, updated) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/admin/content/{id}"),
        true,
        &[],
        Some(json!({"status": "published"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["version"], 2);

    // Now public.
    let (status, _, item) = send(&app, Method::GET, "/api/v1/content/project/x", false, &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(item["version"], 2);
    assert_eq!(item["data"]["title"], "T");
}

#[tokio::test]
async fn history_and_restore() {
    let app = test_app();

    let (_, _, created) = send(
        &app,
        Method::POST,
        "/api/v1/admin/content",
        true,
        &[],
        Some(project_body("x")),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    send(
        &app,
        Method::PUT,
        &format!("/api/v1/admin/content/{id}"),
        true,
        &[],
        Some(json!({"status": "published"})),
    )
    .await;
    let (_, _, v3) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/admin/content/{id}"),
        true,
        &[],
        Some(json!({"data": {"title": "T2", "description": "D"}})),
    )
    .await;
    assert_eq!(v3["version"], 3);

    // History is paginated, newest version first.
    let (status, _, history) = send(
        &app,
        Method::GET,
        &format!("/api/v1/admin/content/{id}/history"),
        true,
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let items = history["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert!(items[0]["version"].as_i64() >= items[1]["version"].as_i64());

    // Restore version 2: new version 4, old title back.
    let (status, _, restored) = send(
        &app,
        Method::POST,
        &format!("/api/v1/admin/content/{id}/restore"),
        true,
        &[],
        Some(json!({"version": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(restored["version"], 4);
    assert_eq!(restored["data"]["title"], "T");
}

#[tokio::test]
async fn duplicate_slug_conflicts() {
    let app = test_app();

    let (status, _, _) = send(
        &app,
        Method::POST,
        "/api/v1/admin/content",
        true,
        &[],
        Some(project_body("x")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, error) = send(
        &app,
        Method::POST,
        "/api/v1/admin/content",
        true,
        &[],
        Some(project_body("x")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"]["code"], "CONFLICT");
    assert!(error["error"]["requestId"].is_string());
}

#[tokio::test]
async fn validation_errors_carry_fields() {
    let app = test_app();

    let (status, _, error) = send(
        &app,
        Method::POST,
        "/api/v1/admin/content",
        true,
        &[],
        Some(json!({"type": "project", "slug": "x", "data": {"description": "D"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"]["code"], "VALIDATION_ERROR");
    assert!(error["error"]["fields"]["title"].is_array());
}

#[tokio::test]
async fn admin_requires_the_shared_secret() {
    let app = test_app();

    let (status, _, error) =
        send(&app, Method::GET, "/api/v1/admin/content", false, &[], None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error["error"]["code"], "UNAUTHORIZED");

    let (status, _, _) = send(
        &app,
        Method::GET,
        "/api/v1/admin/content",
        false,
        &[("x-admin-key", "wrong-key")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn soft_delete_masks_hard_delete_drops_history() {
    let app = test_app();

    let (_, _, created) = send(
        &app,
        Method::POST,
        "/api/v1/admin/content",
        true,
        &[],
        Some(project_body("x")),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _, body) = send(
        &app,
        Method::DELETE,
        &format!("/api/v1/admin/content/{id}"),
        true,
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hard"], false);

    // Soft-deleted rows stay visible to includeDeleted listings.
    let (_, _, listing) = send(
        &app,
        Method::GET,
        "/api/v1/admin/content?includeDeleted=true",
        true,
        &[],
        None,
    )
    .await;
    assert_eq!(listing["items"].as_array().unwrap().len(), 1);

    let (status, _, _) = send(
        &app,
        Method::DELETE,
        &format!("/api/v1/admin/content/{id}?hard=true"),
        true,
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(
        &app,
        Method::GET,
        &format!("/api/v1/admin/content/{id}/history"),
        true,
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn idempotency_key_replays_create() {
    let app = test_app();
    let headers = [("idempotency-key", "op-123")];

    let (status, _, first) = send(
        &app,
        Method::POST,
        "/api/v1/admin/content",
        true,
        &headers,
        Some(project_body("x")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, second) = send(
        &app,
        Method::POST,
        "/api/v1/admin/content",
        true,
        &headers,
        Some(project_body("x")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["id"], second["id"]);
}

#[tokio::test]
async fn public_list_serves_etag_and_304() {
    let app = test_app();

    let (status, headers, _) = send(&app, Method::GET, "/api/v1/content", false, &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers["cache-control"].to_str().unwrap(),
        "public, max-age=60"
    );
    let etag = headers["etag"].to_str().unwrap().to_string();

    let (status, _, _) = send(
        &app,
        Method::GET,
        "/api/v1/content",
        false,
        &[("if-none-match", etag.as_str())],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_MODIFIED);

    let (_, headers, _) =
        send(&app, Method::GET, "/api/v1/content/bundle", false, &[], None).await;
    assert_eq!(
        headers["cache-control"].to_str().unwrap(),
        "public, max-age=300"
    );
}

#[tokio::test]
async fn every_response_carries_a_request_id() {
    let app = test_app();

    let (_, headers, _) = send(&app, Method::GET, "/api/health", false, &[], None).await;
    assert!(headers.contains_key("x-request-id"));

    let (_, headers, _) = send(
        &app,
        Method::GET,
        "/api/health",
        false,
        &[("x-request-id", "req-42")],
        None,
    )
    .await;
    assert_eq!(headers["x-request-id"].to_str().unwrap(), "req-42");
}

#[tokio::test]
async fn health_and_readiness_probes() {
    let app = test_app();

    let (status, _, body) = send(&app, Method::GET, "/api/health", false, &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _, _) = send(&app, Method::GET, "/api/health/live", false, &[], None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(&app, Method::GET, "/ready", false, &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn mcp_is_mounted_under_the_gateway() {
    let app = test_app();

    let (status, headers, body) = send(
        &app,
        Method::POST,
        "/mcp",
        false,
        &[],
        Some(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.contains_key("mcp-session-id"));
    assert_eq!(body["result"]["serverInfo"]["name"], "folio");
}
