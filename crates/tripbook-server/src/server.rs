//! Server state management and orchestration.
//!
//! Owns the inventory, the connection registry and the broadcaster shared by
//! every connection handler.

use crate::config::ServerConfig;
use crate::error::{ServerError, StoreError};
use crate::inventory::Inventory;
use crate::registry::{Broadcaster, ConnectionRegistry};
use crate::store::{InventoryStore, MemoryStore};
use std::sync::Arc;
use std::time::SystemTime;

/// Shared application state for connection handlers.
#[derive(Debug)]
pub struct AppState {
    /// Business operations over the store
    inventory: Inventory,

    /// Change fan-out to connections and subscribers
    broadcaster: Broadcaster,

    /// Lines buffered per connection
    outbound_queue: usize,

    /// Server start time
    started_at: SystemTime,
}

impl AppState {
    /// Create application state from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if the snapshot cannot be loaded.
    pub fn new(config: &ServerConfig) -> Result<Self, ServerError> {
        let store = match &config.data {
            Some(path) => {
                tracing::info!("Loading inventory snapshot from {}", path.display());
                MemoryStore::open(path)?
            }
            None => {
                tracing::info!("No snapshot configured, inventory is memory-only");
                MemoryStore::new()
            }
        };

        let state = Self::with_store(Arc::new(store), config.outbound_queue)?;

        let inventory = state.inventory();
        tracing::info!(
            "Loaded {} trips and {} users",
            inventory.store().trips()?.len(),
            inventory.store().users()?.len()
        );

        Ok(state)
    }

    /// Create application state over an existing store.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the store cannot be read.
    pub fn with_store(
        store: Arc<dyn InventoryStore>,
        outbound_queue: usize,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            inventory: Inventory::new(store)?,
            broadcaster: Broadcaster::new(Arc::new(ConnectionRegistry::new())),
            outbound_queue: outbound_queue.max(1),
            started_at: SystemTime::now(),
        })
    }

    /// Inventory operations.
    #[must_use]
    pub const fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    /// Change broadcaster; external layers subscribe here.
    #[must_use]
    pub const fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Outbound queue capacity per connection.
    #[must_use]
    pub const fn outbound_queue(&self) -> usize {
        self.outbound_queue
    }

    /// Get server uptime in seconds.
    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.started_at)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Server orchestration.
pub struct Server {
    /// Shared application state
    state: Arc<AppState>,
    /// Server configuration
    config: ServerConfig,
}

impl Server {
    /// Create new server with configuration.
    ///
    /// Validates the configuration, loads the inventory snapshot and
    /// prepares shared state.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` for an invalid configuration, or
    /// `ServerError::Store` if the snapshot cannot be loaded.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let state = AppState::new(&config)?;

        Ok(Self {
            state: Arc::new(state),
            config,
        })
    }

    /// Shared application state.
    #[must_use]
    pub const fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Run the TCP listener until interrupted.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if binding fails or the shutdown signal cannot
    /// be installed.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Starting Tripbook reservation server");
        tracing::info!(
            "TCP server binding to: {} ({} workers)",
            self.config.bind,
            self.config.max_connections
        );

        let listener = crate::tcp::bind(self.config.bind).await?;
        let state = Arc::clone(&self.state);
        let max_connections = self.config.max_connections;

        let tcp_server = tokio::spawn(async move {
            if let Err(e) = crate::tcp::serve(listener, state, max_connections).await {
                tracing::error!("TCP server failed: {e}");
            }
        });

        tokio::signal::ctrl_c().await.map_err(|e| {
            ServerError::Shutdown(format!("Failed to listen for shutdown signal: {e}"))
        })?;

        tracing::info!(
            "Shutdown signal received after {}s, stopping server",
            self.state.uptime_seconds()
        );

        tcp_server.abort();

        Ok(())
    }
}
