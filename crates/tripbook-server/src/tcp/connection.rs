//! Per-socket connection handler.
//!
//! The read half runs the request loop; the write half belongs to a writer
//! task draining the connection's outbound queue. Replies and broadcast
//! notifications share that queue, so everything written to one socket is
//! totally ordered.

use crate::error::ProtocolError;
use crate::server::AppState;
use crate::tcp::handlers;
use std::borrow::Cow;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;

/// Serve one client until it disconnects.
///
/// # Errors
///
/// Returns `ProtocolError::Io` if reading from the socket fails.
pub async fn handle_connection(socket: TcpStream, state: Arc<AppState>) -> Result<(), ProtocolError> {
    let addr = socket.peer_addr()?;
    let (read_half, write_half) = socket.into_split();

    let (outbound, queue) = mpsc::channel(state.outbound_queue());
    let registration = state.broadcaster().registry().register(outbound.clone());
    let conn_id = registration.id();
    tracing::info!("Client {addr} connected as {conn_id}");

    let writer = tokio::spawn(write_lines(write_half, queue));

    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::new();
    let result = loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break Ok(()),
            Ok(_) => {}
            Err(e) => break Err(ProtocolError::Io(e)),
        }
        let line = decode_line(&buf);
        tracing::debug!("Received from {conn_id}: {line}");

        let command_state = Arc::clone(&state);
        let reply = tokio::task::spawn_blocking(move || {
            handlers::handle_command(&line, Some(conn_id), &command_state)
        })
        .await;

        let reply = match reply {
            Ok(Some(reply)) => reply,
            Ok(None) => continue,
            Err(e) => {
                tracing::error!("Command task for {conn_id} failed: {e}");
                continue;
            }
        };

        if outbound.send(reply.to_string()).await.is_err() {
            // Writer is gone, so the peer cannot receive anything more.
            break Ok(());
        }
    };

    drop(registration);
    drop(outbound);
    if let Err(e) = writer.await {
        tracing::warn!("Writer task for {conn_id} failed: {e}");
    }

    tracing::info!("Client {addr} ({conn_id}) disconnected");
    result
}

/// Decode one request line without its terminator.
///
/// Invalid UTF-8 is replaced with U+FFFD so the request still gets a reply.
fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    match String::from_utf8_lossy(bytes) {
        Cow::Borrowed(line) => line.to_string(),
        Cow::Owned(line) => {
            tracing::debug!("Request line is not valid UTF-8, decoded lossily");
            line
        }
    }
}

/// Drain the outbound queue onto the socket, one line per entry.
async fn write_lines(mut socket: OwnedWriteHalf, mut queue: mpsc::Receiver<String>) {
    while let Some(mut line) = queue.recv().await {
        line.push('\n');
        if let Err(e) = socket.write_all(line.as_bytes()).await {
            tracing::debug!("Write failed, closing writer: {e}");
            return;
        }
    }
    let _ = socket.shutdown().await;
}
