//! Process-wide session bookkeeping
//!
//! Holds the active connection count and a diagnostic snapshot per
//! connection. Neither is consulted for protocol decisions; the operational
//! endpoints read them, and each connection writes only its own entry through
//! its [`ConnectionGuard`].

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use tracing::debug;

use super::machine::SessionPhase;
use super::peer::PeerKind;

/// Point-in-time view of one call session
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub connection_id: String,
    pub session_id: String,
    pub phase: SessionPhase,
    pub has_greeted: bool,
    pub turns: usize,
    pub media_packets: u64,
    pub peer: PeerKind,
    pub connected_at: Instant,
}

impl SessionSnapshot {
    pub fn connected_seconds(&self) -> u64 {
        self.connected_at.elapsed().as_secs()
    }
}

/// Registry of live connections
#[derive(Debug, Default)]
pub struct SessionRegistry {
    active: AtomicUsize,
    sessions: DashMap<String, SessionSnapshot>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a newly accepted connection.
    ///
    /// The count is released when the returned guard is dropped.
    pub fn acquire(self: &Arc<Self>, connection_id: impl Into<String>) -> ConnectionGuard {
        let connection_id = connection_id.into();
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(connection_id = %connection_id, active, "Connection registered");

        ConnectionGuard {
            registry: Arc::clone(self),
            connection_id,
        }
    }

    /// Number of connections currently open
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Snapshots of every registered session, oldest connection first
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        let mut snapshots: Vec<SessionSnapshot> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.connected_at);
        snapshots
    }
}

/// RAII registration of one connection
#[derive(Debug)]
pub struct ConnectionGuard {
    registry: Arc<SessionRegistry>,
    connection_id: String,
}

impl ConnectionGuard {
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Replace this connection's diagnostic snapshot
    pub fn publish(&self, snapshot: SessionSnapshot) {
        self.registry
            .sessions
            .insert(self.connection_id.clone(), snapshot);
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.sessions.remove(&self.connection_id);
        let remaining = self.registry.active.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!(
            connection_id = %self.connection_id,
            active = remaining,
            "Connection released"
        );
    }
}
