use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ai::{ChatOrchestrator, ToolRegistry};
use ai_client::AnthropicClient;
use anyhow::Context;
use database::{Clock, SqliteStore, SystemClock};
use settings_loader::AppSettings;

use crate::{repository::StoreRepository, router::create_router, state::AppState};

/// Used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "backend_api=debug,ai=debug,database=info,tower_http=debug";

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();
}

/// Opens the store and wires the chat orchestrator when a model key is available.
pub fn build_state(settings: &AppSettings) -> anyhow::Result<AppState> {
    let store = Arc::new(
        SqliteStore::open(&settings.store)
            .with_context(|| format!("Opening store at {}", settings.store.path.display()))?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let chat = if settings.model.is_configured() {
        let client = AnthropicClient::new(settings.model.clone())?;
        let registry = ToolRegistry::new(store.clone(), clock.clone());
        Some(Arc::new(ChatOrchestrator::new(
            Arc::new(client),
            Arc::new(registry),
            clock.clone(),
            settings.chat.clone(),
        )))
    } else {
        tracing::warn!("ANTHROPIC_API_KEY is not set; /chat will answer 503");
        None
    };

    let repo = StoreRepository::new(store, clock, Duration::from_secs(settings.server.store_timeout_secs));

    Ok(AppState {
        repo: Arc::new(repo),
        chat,
    })
}

/// Run the API server
pub async fn run_server(settings: AppSettings) -> anyhow::Result<()> {
    let state = build_state(&settings)?;
    let app = create_router(state, &settings.server.cors_origins);

    let addr = settings
        .server
        .bind_address()
        .parse::<SocketAddr>()
        .with_context(|| format!("Invalid bind address {}", settings.server.bind_address()))?;
    tracing::info!(model = %settings.model.model, "Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
