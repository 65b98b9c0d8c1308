//! Talking Heads - two local models debating each other
//!
//! Serves an HTTP/SSE API over a single conversation runtime that relays
//! replies between two personas backed by an Ollama server.

mod api;
mod backend_process;
mod catalog;
mod config;
mod history;
mod llm;
mod persona;
mod prompt;
mod render;
mod runtime;
mod session_log;
mod state_machine;

use api::{create_router, AppState};
use backend_process::{wait_until_ready, ProcessHandle};
use catalog::CatalogState;
use config::AppConfig;
use llm::{LoggingBackend, OllamaClient};
use persona::{PersonaPair, Side};
use runtime::ConversationRuntime;
use session_log::{locale_from_env, SessionLog};
use state_machine::ConvContext;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
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
                .unwrap_or_else(|_| "talking_heads=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env();
    tracing::info!(
        host = %config.ollama_host,
        port = config.port,
        max_turns = config.max_turns,
        use_context = config.use_context,
        "Configuration loaded"
    );

    // Optional local model server
    let server = match &config.ollama_bin {
        Some(bin) => Some(ProcessHandle::start(bin)?),
        None => None,
    };

    let backend = Arc::new(LoggingBackend::new(OllamaClient::new(&config.ollama_host)?));

    let raw_ids = match wait_until_ready(backend.as_ref(), config.readiness).await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::error!(
                host = %config.ollama_host,
                error = %e,
                "Model server unavailable. Start it with `ollama serve` or set TALKING_HEADS_OLLAMA_BIN, then restart."
            );
            if let Some(server) = server {
                server.stop().await?;
            }
            return Err(e.into());
        }
    };

    // Catalog and default personas
    let mut rng = rand::thread_rng();
    let catalog = CatalogState::from_raw_ids(&raw_ids, &mut rng);
    if catalog.aliases.is_empty() {
        tracing::warn!(models = ?raw_ids, "No recognised models; both personas start without a model");
    }
    let mut personas = PersonaPair::new(
        catalog.default_choice(Side::Left, &mut rng),
        catalog.default_choice(Side::Right, &mut rng),
    );
    personas.left.max_response_tokens = config.max_response_tokens;
    personas.right.max_response_tokens = config.max_response_tokens;
    tracing::info!(
        left = personas.left.display_name(),
        right = personas.right.display_name(),
        aliases = catalog.aliases.len(),
        "Model catalog ready"
    );

    // Session log
    let log = config.log_dir.as_ref().map(|dir| SessionLog::new(dir, &locale_from_env()));
    if let Some(log) = &log {
        tracing::info!(
            session = log.session_id(),
            path = %log.path().display(),
            "Session log enabled"
        );
    }

    // Conversation runtime
    let shutdown = CancellationToken::new();
    let context = ConvContext::new(personas, config.max_turns, config.use_context);
    let runtime = ConversationRuntime::new(context, backend, log, config.request_timeout)
        .with_shutdown(shutdown.clone());
    let state = AppState::new(runtime.handle(), catalog);
    let runtime_task = tokio::spawn(runtime.run());

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Talking Heads server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutting down");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = runtime_task.await {
        tracing::warn!(error = %e, "Conversation runtime ended abnormally");
    }
    if let Some(server) = server {
        server.stop().await?;
    }

    Ok(())
}
