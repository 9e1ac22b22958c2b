//! QueryGuard API - Security-Gated Natural-Language SQL Assistant
//!
//! Users ask questions in natural language; the service answers with prose
//! backed by a real query. Three guarantees hold across every turn:
//!
//! - only read-only, allow-listed SQL ever reaches the database;
//! - sensitive schema elements and sensitive values never leave the
//!   security boundary unmasked;
//! - the model is a translation oracle (question->SQL, result->prose),
//!   never an authority on access control.

mod capability;
mod config;
mod db;
mod error;
mod history;
mod masking;
mod model;
mod models;
mod pipeline;
mod policy;
mod routes;
mod schema;
mod session;
mod state;
mod validator;

use crate::capability::DatabaseCapability;
use crate::config::Settings;
use crate::db::PostgresCapability;
use crate::policy::MaskPolicy;
use crate::routes::create_router;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("Starting QueryGuard - secure natural-language SQL assistant...");

    // Load configuration - any bad value is fatal before the first turn
    let settings = Settings::load()?;
    let policy = Arc::new(MaskPolicy::load()?);
    info!(
        "Configuration loaded ({} patterns, {} blocked keywords)",
        policy.patterns.len(),
        policy.blocked_keywords.len()
    );

    // Connect to the target database
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL not set in environment or .env file"))?;

    let database: Arc<dyn DatabaseCapability> = match PostgresCapability::connect(&database_url).await
    {
        Ok(capability) => Arc::new(capability),
        Err(e) => {
            error!("FATAL: Failed to connect to the database: {}", e);
            anyhow::bail!("Cannot start server without a database connection");
        }
    };

    // Snapshot the schema once up front; /api/schema/refresh re-introspects
    let schema = database
        .introspect_schema()
        .await
        .map_err(|e| anyhow::anyhow!("Initial schema introspection failed: {}", e))?;
    info!(
        "Schema snapshot captured: {} tables (checksum {})",
        schema.tables.len(),
        schema.checksum
    );

    // Build the model capability
    let model = model::provider_from_config(&settings.model);
    info!(
        "Model capability ready: {:?} / {}",
        settings.model.provider, settings.model.model
    );

    let state = Arc::new(AppState::new(
        database,
        model,
        policy,
        settings.limits,
        schema,
    ));

    // Build the router
    let app = create_router(state, &settings);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("Server listening on http://{}", addr);
    info!("");
    info!("API Endpoints:");
    info!("   GET  /health                       - Liveness check");
    info!("   POST /api/sessions                 - Create a chat session");
    info!("   GET  /api/sessions                 - List sessions");
    info!("   DELETE /api/sessions/{{id}}          - Delete a session");
    info!("   POST /api/sessions/{{id}}/messages   - Ask a question (one turn)");
    info!("   GET  /api/schema                   - Sanitized schema (model view)");
    info!("   POST /api/schema/refresh           - Re-introspect the database");
    info!("");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,queryguard_api=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
