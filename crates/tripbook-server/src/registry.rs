//! Live connection tracking and change fan-out.
//!
//! Every connection owns a bounded outbound queue drained by its writer task.
//! The registry maps connection ids to the sending side of those queues, so a
//! broadcast is just a non-blocking enqueue per peer: a slow or dead peer
//! loses the notification but never delays the command that caused it.

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, mpsc};

/// Identifier assigned to each accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Which client view became stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Trip list (and seat counts) changed
    Trips,
    /// User list changed
    Users,
}

impl ChangeKind {
    /// Notification line pushed to clients.
    #[must_use]
    pub const fn wire_message(self) -> &'static str {
        match self {
            Self::Trips => "UPDATE_TRIPS",
            Self::Users => "UPDATE_USERS",
        }
    }
}

/// A committed mutation, tagged with the connection that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    /// What changed
    pub kind: ChangeKind,
    /// Connection to leave out of the fan-out, if any
    pub origin: Option<ConnectionId>,
}

/// Set of open connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, mpsc::Sender<String>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection's outbound queue.
    ///
    /// The returned guard removes the entry when dropped.
    pub fn register(self: &Arc<Self>, outbound: mpsc::Sender<String>) -> Registration {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.connections.insert(id, outbound);
        tracing::debug!("Registered {id}, {} live connections", self.len());
        Registration {
            id,
            registry: Arc::clone(self),
        }
    }

    fn unregister(&self, id: ConnectionId) {
        if self.connections.remove(&id).is_some() {
            tracing::debug!("Unregistered {id}, {} live connections", self.len());
        }
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Enqueue `line` on every connection except `exclude`.
    ///
    /// Returns how many peers accepted the line.
    pub fn broadcast(&self, line: &str, exclude: Option<ConnectionId>) -> usize {
        let mut delivered = 0;
        for entry in &self.connections {
            if Some(*entry.key()) == exclude {
                continue;
            }
            match entry.value().try_send(line.to_string()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("Outbound queue of {} full, dropping {line}", entry.key());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!("{} already closed, skipping {line}", entry.key());
                }
            }
        }
        delivered
    }
}

/// Registry membership of one connection; unregisters on drop.
#[derive(Debug)]
pub struct Registration {
    id: ConnectionId,
    registry: Arc<ConnectionRegistry>,
}

impl Registration {
    /// Id of the registered connection.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

/// Publishes change events to connected clients and external subscribers.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    events: broadcast::Sender<ChangeEvent>,
}

impl Broadcaster {
    /// Capacity of the subscriber channel; lagging subscribers skip events.
    pub const EVENT_CAPACITY: usize = 256;

    /// Create a broadcaster over `registry`.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        let (events, _) = broadcast::channel(Self::EVENT_CAPACITY);
        Self { registry, events }
    }

    /// Registry of live connections.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Receive every future change event.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    /// Notify all connections but the origin, then external subscribers.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let delivered = self
            .registry
            .broadcast(event.kind.wire_message(), event.origin);
        // No subscribers is fine.
        let _ = self.events.send(event);
        tracing::debug!(
            "Published {} to {delivered} peers",
            event.kind.wire_message()
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registration_guard_unregisters_once() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, _rx) = mpsc::channel(4);

        let first = registry.register(tx.clone());
        let second = registry.register(tx);
        assert_ne!(first.id(), second.id());
        assert_eq!(registry.len(), 2);

        drop(first);
        assert_eq!(registry.len(), 1);
        drop(second);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_skips_origin() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let a = registry.register(tx_a);
        let _b = registry.register(tx_b);

        let delivered = registry.broadcast("UPDATE_TRIPS", Some(a.id()));
        assert_eq!(delivered, 1);
        assert_eq!(rx_b.recv().await.unwrap(), "UPDATE_TRIPS");
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_or_closed_peer_does_not_block_others() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx_full, _rx_full) = mpsc::channel(1);
        tx_full.try_send("pending".to_string()).unwrap();
        let (tx_closed, rx_closed) = mpsc::channel(1);
        drop(rx_closed);
        let (tx_ok, mut rx_ok) = mpsc::channel(1);

        let _full = registry.register(tx_full);
        let _closed = registry.register(tx_closed);
        let _ok = registry.register(tx_ok);

        assert_eq!(registry.broadcast("UPDATE_USERS", None), 1);
        assert_eq!(rx_ok.recv().await.unwrap(), "UPDATE_USERS");
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let broadcaster = Broadcaster::new(Arc::new(ConnectionRegistry::new()));
        let mut events = broadcaster.subscribe();

        let event = ChangeEvent {
            kind: ChangeKind::Trips,
            origin: None,
        };
        assert_eq!(broadcaster.publish(event), 0);
        assert_eq!(events.recv().await.unwrap(), event);
    }
}
