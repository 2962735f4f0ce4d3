use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post, put};
use axum::{middleware, Router};
use folio_chat::{ChatOrchestrator, ChatStore};
use folio_content::ContentRepository;
use folio_core::cache::{Cache, MemoryCache};
use folio_core::config::{Environment, FolioConfig};
use folio_core::events::EventBus;
use folio_limiter::RateLimiter;
use folio_llm::{CircuitBreaker, CircuitBreakerConfig, LlmProvider, OpenAiClient};
use rusqlite::Connection;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ErrCtx;
use crate::request_id::RequestId;

/// Central shared state — passed as Arc<AppState> to all handlers.
pub struct AppState {
    pub config: FolioConfig,
    pub repo: Arc<ContentRepository>,
    pub chat: ChatOrchestrator,
    pub cache: Arc<dyn Cache>,
    pub events: Arc<EventBus>,
}

impl AppState {
    /// Wire every subsystem from config: SQLite connections, cache, limiter,
    /// LLM client behind its breaker, and the chat orchestrator.
    pub fn from_config(config: FolioConfig) -> anyhow::Result<Arc<Self>> {
        let events = Arc::new(EventBus::new());
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());

        let repo = Arc::new(ContentRepository::new(
            open_db(&config.database.path)?,
            events.clone(),
        ));
        let store = {
            let conn = open_db(&config.database.path)?;
            folio_chat::db::init_db(&conn)?;
            ChatStore::new(conn)
        };

        let provider: Arc<dyn LlmProvider> = Arc::new(OpenAiClient::from_config(&config.llm)?);
        let breaker = Arc::new(CircuitBreaker::new(
            config.llm.provider.clone(),
            CircuitBreakerConfig::default(),
            events.clone(),
        ));
        let limiter = RateLimiter::new(cache.clone(), &config.limiter);
        let tools = folio_tools::content_tools::chat_registry(repo.clone());

        let chat = ChatOrchestrator::new(
            store,
            limiter,
            provider,
            breaker,
            tools,
            events.clone(),
            config.chat.clone(),
            config.llm.clone(),
        );

        Ok(Arc::new(Self {
            config,
            repo,
            chat,
            cache,
            events,
        }))
    }
}

/// Open (and initialise) the SQLite database at `path`.
pub fn open_db(path: &str) -> anyhow::Result<Connection> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=3000;",
    )?;
    folio_content::db::init_db(&conn)?;
    Ok(conn)
}

/// Per-handler error context from the request id and environment.
pub fn err_ctx(state: &AppState, request_id: &RequestId) -> ErrCtx {
    ErrCtx {
        request_id: request_id.0.clone(),
        production: state.config.server.env == Environment::Production,
    }
}

/// Assemble the full router: public content, chat, admin, health, and the
/// mounted MCP transport.
pub fn build_router(state: Arc<AppState>, mcp: Router) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/api/v1/content", get(crate::http::content::list_published))
        .route("/api/v1/content/bundle", get(crate::http::content::bundle))
        .route(
            "/api/v1/content/{type}/{slug}",
            get(crate::http::content::get_by_slug),
        )
        .route("/api/v1/chat", post(crate::http::chat::chat_handler))
        .route(
            "/api/v1/admin/content",
            get(crate::http::admin::list_content).post(crate::http::admin::create_content),
        )
        .route(
            "/api/v1/admin/content/{id}",
            put(crate::http::admin::update_content).delete(crate::http::admin::delete_content),
        )
        .route(
            "/api/v1/admin/content/{id}/history",
            get(crate::http::admin::get_history),
        )
        .route(
            "/api/v1/admin/content/{id}/restore",
            post(crate::http::admin::restore_version),
        )
        .route("/api/health", get(crate::http::health::health))
        .route("/api/health/live", get(crate::http::health::live))
        .route("/ready", get(crate::http::health::ready))
        .with_state(state)
        .nest("/mcp", mcp)
        .layer(middleware::from_fn(crate::request_id::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn cors_layer(config: &FolioConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .cors_origin_list()
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    if origins.is_empty() {
        CorsLayer::new()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
