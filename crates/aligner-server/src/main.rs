//! aligner-server - Context Aligner backend server
//!
//! REST API over the message ingestion pipeline.

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use aligner_core::Database;

mod config;
mod routes;
mod state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("aligner_server=info".parse()?))
        .init();

    info!("aligner-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = config::Config::load()?;
    info!("Database at {:?}", config.database_path);
    if config.llm.is_some() {
        info!("LLM extraction enabled");
    } else {
        info!("No LLM configured, using pattern extraction only");
    }

    let db = Database::open_path(&config.database_path)?;
    let bind_addr = config.bind_addr.clone();
    let state = state::AppState::new(config, db)?;

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
