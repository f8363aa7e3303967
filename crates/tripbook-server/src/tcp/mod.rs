//! TCP listener for the reservation line protocol.

use crate::error::ServerError;
use crate::server::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::time::{Duration, sleep};

pub mod connection;
pub mod handlers;

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Bind the listening socket.
///
/// # Errors
///
/// Returns `ServerError::TcpBindFailed` if the address cannot be bound.
pub async fn bind(bind_addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(bind_addr)
        .await
        .map_err(|source| ServerError::TcpBindFailed {
            addr: bind_addr,
            source,
        })
}

/// Accept connections forever, running at most `max_connections` handlers.
///
/// A worker slot is claimed before `accept`, so once the pool is full new
/// clients wait in the kernel backlog. Accept failures are logged and never
/// stop the loop.
///
/// # Errors
///
/// Returns `ServerError::Shutdown` if the worker pool is closed.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    max_connections: usize,
) -> Result<(), ServerError> {
    let workers = Arc::new(Semaphore::new(max_connections.max(1)));

    if let Ok(addr) = listener.local_addr() {
        tracing::info!("TCP server listening on {addr}");
    }

    loop {
        let permit = Arc::clone(&workers)
            .acquire_owned()
            .await
            .map_err(|e| ServerError::Shutdown(format!("Worker pool closed: {e}")))?;

        let (socket, addr) = loop {
            match listener.accept().await {
                Ok(accepted) => break accepted,
                Err(e) => {
                    tracing::error!("Failed to accept TCP connection: {e}");
                    sleep(ACCEPT_BACKOFF).await;
                }
            }
        };

        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = connection::handle_connection(socket, state).await {
                tracing::warn!("TCP connection from {addr} failed: {e}");
            }
        });
    }
}
