//! Tripbook reservation server binary entry point.
//!
//! This is a thin wrapper around the tripbook-server library that:
//! 1. Initializes logging
//! 2. Parses command-line arguments
//! 3. Validates configuration and starts the server

use anyhow::Result;
use tripbook_server::{Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Tripbook reservation server starting...");

    let config = ServerConfig::from_args();

    tracing::info!(
        "Configuration loaded: TCP={}, data={:?}, workers={}",
        config.bind,
        config.data,
        config.max_connections
    );

    let server = Server::new(config)?;
    server.run().await?;

    Ok(())
}
