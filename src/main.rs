//! chat-relay - relays chat messages to Gemini and keeps the conversation
//!
//! Serves `POST /chat` and `GET /history` for a single conversation whose
//! history lives in a JSON file.
//!
//! `chat-relay --list-models` prints the models the configured key can use.

mod api;
mod codec;
mod config;
mod history;
mod llm;
mod session;

use api::{create_router, AppState};
use config::Config;
use history::{HistoryStore, JsonFileStore};
use llm::{GeminiService, LlmService, LoggingService};
use session::ChatSession;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_relay=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env().inspect_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
    })?;

    let gemini = GeminiService::new(
        config.api_key.clone(),
        config.model.clone(),
        &config.base_url,
        config.provider_timeout,
    )?;

    if std::env::args().skip(1).any(|arg| arg == "--list-models") {
        for model in gemini.list_models().await? {
            match model.display_name {
                Some(display) => println!("{}\t{display}", model.name),
                None => println!("{}", model.name),
            }
        }
        return Ok(());
    }

    let provider: Arc<dyn LlmService> = Arc::new(LoggingService::new(Arc::new(gemini)));

    // Load history
    let store: Arc<dyn HistoryStore> = Arc::new(JsonFileStore::new(
        config.history_path.clone(),
        config.history_policy,
    ));
    let history = store.load().await?;
    tracing::info!(
        path = %store.location(),
        turns = history.len(),
        policy = ?config.history_policy,
        "History loaded"
    );

    let session = Arc::new(ChatSession::new(
        provider,
        store.clone(),
        config.session_settings(),
        history,
    ));
    tracing::info!(
        model = %session.model(),
        timeout_secs = config.provider_timeout.as_secs(),
        context_turns = ?config.context_turns,
        "Chat session ready"
    );

    let state = AppState::new(session, store);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state, config.max_body_bytes)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    tracing::info!("chat-relay listening on {}", config.bind);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
