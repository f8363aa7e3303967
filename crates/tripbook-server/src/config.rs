//! Server configuration management.
//!
//! Configuration can be provided via:
//! - CLI arguments (`--bind`, `--data`, etc.)
//! - Environment variables (`TRIPBOOK_BIND`, etc.)
//! - Default values
//!
//! # Example
//!
//! ```no_run
//! use tripbook_server::ServerConfig;
//!
//! let config = ServerConfig::from_args();
//! config.validate().expect("Invalid configuration");
//!
//! println!("TCP server will bind to: {}", config.bind);
//! println!("Worker pool size: {}", config.max_connections);
//! ```

use crate::error::ConfigError;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration loaded from CLI args and environment variables.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "tripbook-server",
    about = "Concurrent trip reservation server for desktop booking clients",
    version
)]
pub struct ServerConfig {
    /// TCP bind address for the line protocol
    #[arg(long, env = "TRIPBOOK_BIND", default_value = "0.0.0.0:5556")]
    pub bind: SocketAddr,

    /// JSON snapshot holding trips, customers, reservations and users.
    /// Without it the inventory lives in memory only.
    #[arg(long, env = "TRIPBOOK_DATA")]
    pub data: Option<PathBuf>,

    /// Maximum number of connections served at once
    #[arg(long, env = "TRIPBOOK_MAX_CONNECTIONS", default_value_t = 20)]
    pub max_connections: usize,

    /// Lines buffered per connection before notifications to it are dropped
    #[arg(long, env = "TRIPBOOK_OUTBOUND_QUEUE", default_value_t = 64)]
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5556)),
            data: None,
            max_connections: 20,
            outbound_queue: 64,
        }
    }
}

impl ServerConfig {
    /// Parse configuration from command-line arguments.
    #[must_use]
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - the worker pool or outbound queue size is zero
    /// - the snapshot's parent directory doesn't exist
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_connections",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.outbound_queue == 0 {
            return Err(ConfigError::InvalidValue {
                field: "outbound_queue",
                reason: "must be at least 1".to_string(),
            });
        }

        if let Some(data) = &self.data {
            let parent = data
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            if !parent.is_dir() {
                return Err(ConfigError::MissingRequired(format!(
                    "snapshot directory not found: {}",
                    parent.display()
                )));
            }
        }

        Ok(())
    }
}
