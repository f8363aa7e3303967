//! Error types for the reservation server.
//!
//! All errors use thiserror for consistent error handling across the codebase.

use crate::model::{ReservationId, TripId, UserId};
use std::path::PathBuf;
use thiserror::Error;

/// Persistence errors raised by an [`InventoryStore`](crate::store::InventoryStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to read the snapshot file
    #[error("Failed to load snapshot from {path}: {source}")]
    LoadFailed {
        /// Path to the snapshot file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write the snapshot file
    #[error("Failed to persist snapshot to {path}: {source}")]
    PersistFailed {
        /// Path to the snapshot file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Invalid JSON in snapshot file
    #[error("Invalid JSON in snapshot file: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Insert of a row whose id is already taken
    #[error("{entity} with ID {id} already exists")]
    DuplicateId {
        /// Table name
        entity: &'static str,
        /// Conflicting id
        id: u32,
    },

    /// Update or delete of a row that does not exist
    #[error("{entity} not found with ID: {id}")]
    MissingId {
        /// Table name
        entity: &'static str,
        /// Missing id
        id: u32,
    },
}

/// Business-rule and persistence failures of inventory operations.
///
/// The `Display` text is what clients see after the `#` of a failure reply.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Trip does not exist
    #[error("Trip not found: {0}")]
    TripNotFound(TripId),

    /// Reservation does not exist
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// User does not exist
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// Requested more tickets than the trip has seats
    #[error("Not enough seats available")]
    InsufficientSeats {
        /// Seats requested
        requested: u32,
        /// Seats left on the trip
        available: u32,
    },

    /// Reservation for zero tickets
    #[error("Ticket count must be positive")]
    NoTickets,

    /// Seat count would overflow when restoring seats
    #[error("Seat count overflow on trip {0}")]
    SeatOverflow(TripId),

    /// Username already belongs to another user
    #[error("Username already exists: {0}")]
    DuplicateUsername(String),

    /// Underlying store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A size limit was set to zero
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// Name of the offending option
        field: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// Missing required configuration value
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Server runtime errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind TCP server
    #[error("Failed to bind TCP server to {addr}: {source}")]
    TcpBindFailed {
        /// Address that failed to bind
        addr: std::net::SocketAddr,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Store error while loading initial state
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Server shutdown error
    #[error("Server shutdown error: {0}")]
    Shutdown(String),
}

/// Protocol-level errors for the TCP handler.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A numeric field did not parse
    #[error("Invalid number format")]
    InvalidNumber {
        /// Field name
        field: &'static str,
        /// Raw text received
        value: String,
    },

    /// A required field was absent
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// A text field contained a protocol separator
    #[error("Field {0} contains a reserved character")]
    ReservedCharacter(&'static str),

    /// I/O error during protocol handling
    #[error("Protocol I/O error: {0}")]
    Io(#[from] std::io::Error),
}
