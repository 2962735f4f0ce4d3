use std::net::SocketAddr;
use std::sync::Arc;

use folio_gateway::app;
use folio_mcp::{McpHttpState, McpServer};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "folio_gateway=info,tower_http=debug".into()),
        )
        .init();

    // A panicking worker task must not die silently.
    std::panic::set_hook(Box::new(|info| {
        error!(panic = %info, "panic");
    }));

    // load config: explicit FOLIO_CONFIG path > ./folio.toml
    let config_path = std::env::var("FOLIO_CONFIG").ok();
    let config = folio_core::config::FolioConfig::load(config_path.as_deref())?;

    if config.server.telemetry {
        info!("telemetry toggle is set but no exporter is bundled; ignoring");
    }

    // `folio-gateway mcp-stdio` serves a single MCP peer over stdin/stdout.
    if std::env::args().nth(1).as_deref() == Some("mcp-stdio") {
        let conn = app::open_db(&config.database.path)?;
        let repo = Arc::new(folio_content::ContentRepository::new(
            conn,
            Arc::new(folio_core::events::EventBus::new()),
        ));
        return folio_mcp::stdio::run(McpServer::new(repo)).await;
    }

    let bind = config.server.bind.clone();
    let port = config.server.port;

    let state = app::AppState::from_config(config)?;
    spawn_event_logger(state.events.clone());

    let mcp_state = McpHttpState::new(McpServer::new(state.repo.clone()));
    let router = app::build_router(state, folio_mcp::router(mcp_state));

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("folio gateway listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Drain the event bus into the structured log. Registered before the server
/// starts taking traffic, as all listeners must be.
fn spawn_event_logger(events: Arc<folio_core::events::EventBus>) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(payload) => info!(event = event.key(), payload = %payload, "domain event"),
                Err(_) => info!(event = event.key(), "domain event"),
            }
        }
    });
}
