//! Per-event identity and open-stream bookkeeping.
//!
//! # Responsibilities
//! - Hand out a `conn-<n>` ID for every inbound event
//! - Count comet streams whose body has not ended yet
//! - Tell open streams to finish when the server shuts down
//!
//! A guard is taken when an event arrives and rides inside the response
//! stream, so a long-poll stays counted until its body ends.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::observability::metrics;

// Only uniqueness matters here.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one inbound event and the stream answering it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Shared view of every response stream still open.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    open: Arc<AtomicU64>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            open: Arc::new(AtomicU64::new(0)),
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// Register a stream for a new event.
    pub fn track(&self) -> ConnectionGuard {
        self.open.fetch_add(1, Ordering::SeqCst);
        metrics::stream_opened();
        ConnectionGuard {
            open: Arc::clone(&self.open),
            shutdown_rx: self.shutdown_tx.subscribe(),
            id: ConnectionId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.open.load(Ordering::SeqCst)
    }

    /// Ask every open stream (and any tracked later) to end its body.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Held for as long as one response stream is open.
#[derive(Debug)]
pub struct ConnectionGuard {
    open: Arc<AtomicU64>,
    shutdown_rx: watch::Receiver<bool>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Resolves once the tracker asked streams to finish.
    pub async fn shutdown_requested(&mut self) {
        if self.shutdown_rx.wait_for(|stop| *stop).await.is_err() {
            // Tracker gone without a shutdown request: nothing will ever ask.
            std::future::pending::<()>().await;
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
        metrics::stream_closed();
        tracing::trace!(connection_id = %self.id, "Stream closed");
    }
}
