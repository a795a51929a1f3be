//! Live connection bookkeeping for the status endpoint.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

/// Metadata about one control node connection.
#[derive(Debug)]
pub struct ConnectionMeta {
    pub peer_addr: SocketAddr,
    pub established_at: Instant,
    /// Logical messages decoded on this connection.
    pub messages_received: AtomicU64,
    pub messages_sent: AtomicU64,
}

impl ConnectionMeta {
    pub fn new(peer_addr: SocketAddr) -> Self {
        Self {
            peer_addr,
            established_at: Instant::now(),
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
        }
    }

    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }
}

/// The connection table: keyed on a process-unique connection id.
pub type ConnectionTable = Arc<DashMap<u64, Arc<ConnectionMeta>>>;

/// Create a new empty connection table.
pub fn new_connection_table() -> ConnectionTable {
    Arc::new(DashMap::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_connection_table_creates_empty() {
        let table = new_connection_table();
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn counters_are_shared_through_table() {
        let table = new_connection_table();
        let meta = Arc::new(ConnectionMeta::new("127.0.0.1:4000".parse().unwrap()));
        table.insert(1, meta.clone());

        meta.record_received();
        meta.record_received();
        meta.record_sent();

        let entry = table.get(&1).unwrap();
        assert_eq!(entry.messages_received.load(Ordering::Relaxed), 2);
        assert_eq!(entry.messages_sent.load(Ordering::Relaxed), 1);
    }
}
