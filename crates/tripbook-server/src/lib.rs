//! Trip reservation server.
//!
//! Many desktop clients stay connected at once over a newline-delimited TCP
//! protocol. They browse and search trips, book and cancel seats, and manage
//! trips and operator accounts. Every successful change is pushed to all
//! other connected clients as `UPDATE_TRIPS` or `UPDATE_USERS`, so their
//! views stay current without polling.
//!
//! # Architecture
//!
//! - `model`: trip, customer, reservation and user records
//! - `store`: persistence contract and the in-memory/JSON snapshot store
//! - `inventory`: business operations and their locking discipline
//! - `registry`: live connections, notification fan-out, event subscription
//! - `protocol`: request parsing, reply rendering and record encoding
//! - `tcp`: listener with a bounded worker pool and per-socket handlers
//! - `server`: shared state and orchestration
//! - `config`: CLI/environment configuration
//!
//! # Example
//!
//! ```no_run
//! use tripbook_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     tracing_subscriber::fmt::init();
//!
//!     let config = ServerConfig::from_args();
//!     let server = Server::new(config)?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Consistency
//!
//! Seat counts never go negative: the check and the decrement of a booking
//! run under a per-trip lock and commit together with the reservation row as
//! one atomic store batch.

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::panic))]

pub mod config;
pub mod error;
pub mod inventory;
pub mod model;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod store;
pub mod tcp;

pub use config::ServerConfig;
pub use error::{ConfigError, InventoryError, ProtocolError, ServerError, StoreError};
pub use inventory::{Inventory, ReservationRequest};
pub use model::{Customer, Reservation, Trip, User};
pub use registry::{Broadcaster, ChangeEvent, ChangeKind, ConnectionId, ConnectionRegistry};
pub use server::{AppState, Server};
pub use store::{InventoryStore, MemoryStore, Write, WriteBatch};
