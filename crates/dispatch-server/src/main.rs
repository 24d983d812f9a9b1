//! dispatch-server
//!
//! Axum server exposing sessions, engines and the dispatch loop over a
//! JSON API.

mod handlers;
mod state;
mod tools;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dispatch_core::{DispatchConfig, MemorySessionStore, ToolRegistry, dispatch::DEFAULT_MAX_TOOL_ROUNDS};
use dispatch_runtime::{EnginesConfig, build_registry};

use crate::handlers::{
    create_session, dispatch, health_check, list_messages, list_models, refresh_engines, summarize,
};
use crate::state::AppState;
use crate::tools::{AddTool, DateTimeTool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    // Engines from ENGINES_CONFIG, else from provider env vars
    let engines = match std::env::var("ENGINES_CONFIG") {
        Ok(path) => {
            tracing::info!("Loading engines from {}", path);
            EnginesConfig::load(&path)?
        }
        Err(_) => EnginesConfig::from_env(),
    };
    if engines.engines.is_empty() {
        tracing::warn!("⚠ No engines configured - every dispatch will fail");
        tracing::warn!("  Set OLLAMA_URL, OPENAI_API_KEY or GEMINI_API_KEY, or point ENGINES_CONFIG at a TOML file");
    }

    let registry = build_registry(&engines).await;
    for status in registry.status().await {
        if status.connected {
            tracing::info!("✓ {} ({}): {} models", status.name, status.id, status.models);
        } else {
            tracing::warn!("⚠ {} ({}) not reachable", status.name, status.id);
        }
    }
    for model in registry.models() {
        tracing::info!("  Model: {}{}", model.id, if model.supports_tools { " [tools]" } else { "" });
    }

    // Initialize tools
    let mut tools = ToolRegistry::new();
    tools.register(DateTimeTool);
    tools.register(AddTool);

    tracing::info!("Registered {} tools:", tools.len());
    for name in tools.names() {
        tracing::info!("  • {}", name);
    }

    let max_tool_rounds = std::env::var("MAX_TOOL_ROUNDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_TOOL_ROUNDS);

    let store = match std::env::var("SYSTEM_PROMPT") {
        Ok(prompt) => MemorySessionStore::with_system_prompt(prompt),
        Err(_) => MemorySessionStore::new(),
    };

    // Build application state
    let state = AppState::new(
        registry,
        Arc::new(store),
        Arc::new(tools),
        DispatchConfig { max_tool_rounds },
    );

    let app = router(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 dispatch-server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                        - Engine connectivity");
    tracing::info!("  GET  /api/models                    - List available models");
    tracing::info!("  POST /api/engines/refresh           - Re-enumerate models");
    tracing::info!("  POST /api/sessions                  - Create session");
    tracing::info!("  GET  /api/sessions/{{id}}/messages    - Session history");
    tracing::info!("  POST /api/sessions/{{id}}/dispatch    - Send a turn");
    tracing::info!("  POST /api/sessions/{{id}}/summarize   - Summarize session");

    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/models", get(list_models))
        .route("/api/engines/refresh", post(refresh_engines))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}/messages", get(list_messages))
        .route("/api/sessions/{id}/dispatch", post(dispatch))
        .route("/api/sessions/{id}/summarize", post(summarize))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
