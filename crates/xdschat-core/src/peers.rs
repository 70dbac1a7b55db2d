//! Connection registry for relay peers
//!
//! `ConnectionRegistry` is the read contract status reporting and UI polling code is
//! written against. `PeerTable` is the in-memory implementation the relay connection
//! worker feeds.

use crate::connection::{ConnectedPeer, ConnectionState, PeerSnapshot, RelayRecord};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ----------------------------------------------------------------------------
// Registry Contract
// ----------------------------------------------------------------------------

/// Read-only view over the current set of relay connections
///
/// Implementations must answer from in-memory state and never block on network I/O.
pub trait ConnectionRegistry: Send + Sync {
    /// Snapshot of every tracked connection
    fn connected_peers(&self) -> Vec<PeerSnapshot>;

    /// Number of connections currently in the `Connected` state
    fn connected_count(&self) -> usize {
        self.connected_peers()
            .iter()
            .filter(|peer| peer.state == ConnectionState::Connected)
            .count()
    }
}

// ----------------------------------------------------------------------------
// Peer Table
// ----------------------------------------------------------------------------

/// Concurrent table of relay connections keyed by remote address
#[derive(Debug, Default)]
pub struct PeerTable {
    /// Latest connection object per address
    peers: DashMap<String, Arc<ConnectedPeer>>,
    /// Statistics
    stats: PeerTableCounters,
}

#[derive(Debug, Default)]
struct PeerTableCounters {
    attempts_started: AtomicU64,
    attempts_replaced: AtomicU64,
    peers_removed: AtomicU64,
}

impl PeerTable {
    /// Create an empty peer table
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a fresh connection attempt, replacing any previous object for the address
    pub fn begin_attempt(&self, relay: RelayRecord) -> Arc<ConnectedPeer> {
        let peer = Arc::new(ConnectedPeer::connecting(relay));
        self.stats.attempts_started.fetch_add(1, Ordering::Relaxed);
        if self
            .peers
            .insert(peer.address().to_string(), peer.clone())
            .is_some()
        {
            self.stats.attempts_replaced.fetch_add(1, Ordering::Relaxed);
        }
        peer
    }

    /// Current connection object for an address
    pub fn get(&self, address: &str) -> Option<Arc<ConnectedPeer>> {
        self.peers.get(address).map(|entry| entry.value().clone())
    }

    /// Stop tracking an address
    pub fn remove(&self, address: &str) -> Option<Arc<ConnectedPeer>> {
        let removed = self.peers.remove(address).map(|(_, peer)| peer);
        if removed.is_some() {
            self.stats.peers_removed.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Get count of peers in each state
    pub fn state_counts(&self) -> StateDistribution {
        let mut distribution = StateDistribution::default();

        for entry in self.peers.iter() {
            match entry.value().state() {
                ConnectionState::Connecting => distribution.connecting += 1,
                ConnectionState::Connected => distribution.connected += 1,
                ConnectionState::Failed => distribution.failed += 1,
                ConnectionState::Disconnected => distribution.disconnected += 1,
            }
        }

        distribution
    }

    /// Get table statistics
    pub fn statistics(&self) -> PeerTableStats {
        PeerTableStats {
            attempts_started: self.stats.attempts_started.load(Ordering::Relaxed),
            attempts_replaced: self.stats.attempts_replaced.load(Ordering::Relaxed),
            peers_removed: self.stats.peers_removed.load(Ordering::Relaxed),
        }
    }
}

impl ConnectionRegistry for PeerTable {
    fn connected_peers(&self) -> Vec<PeerSnapshot> {
        let mut peers: Vec<PeerSnapshot> = self
            .peers
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        peers.sort_by(|a, b| a.address.cmp(&b.address));
        peers
    }

    fn connected_count(&self) -> usize {
        self.state_counts().connected
    }
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// Statistics for the peer table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerTableStats {
    /// Number of connection attempts started
    pub attempts_started: u64,
    /// Number of attempts that replaced an older object for the same address
    pub attempts_replaced: u64,
    /// Number of addresses removed
    pub peers_removed: u64,
}

/// Distribution of connections across states
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateDistribution {
    pub connecting: usize,
    pub connected: usize,
    pub failed: usize,
    pub disconnected: usize,
}

impl StateDistribution {
    /// Get total number of connections
    pub fn total(&self) -> usize {
        self.connecting + self.connected + self.failed + self.disconnected
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_attempt_replaces_previous_object() {
        let table = PeerTable::new();
        let first = table.begin_attempt(RelayRecord::seed("10.0.0.1:1000"));
        first.transition(ConnectionState::Failed).unwrap();

        let second = table.begin_attempt(RelayRecord::seed("10.0.0.1:1000"));
        assert_ne!(first.connection_id(), second.connection_id());
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.get("10.0.0.1:1000").unwrap().state(),
            ConnectionState::Connecting
        );

        let stats = table.statistics();
        assert_eq!(stats.attempts_started, 2);
        assert_eq!(stats.attempts_replaced, 1);
    }

    #[test]
    fn test_connected_count_matches_snapshots() {
        let table = PeerTable::new();
        let a = table.begin_attempt(RelayRecord::seed("10.0.0.1:1000"));
        let b = table.begin_attempt(RelayRecord::seed("10.0.0.2:1000"));
        table.begin_attempt(RelayRecord::seed("10.0.0.3:1000"));

        a.transition(ConnectionState::Connected).unwrap();
        b.transition(ConnectionState::Failed).unwrap();

        let snapshots = table.connected_peers();
        assert_eq!(snapshots.len(), 3);
        assert_eq!(snapshots[0].address, "10.0.0.1:1000");

        let connected = snapshots
            .iter()
            .filter(|s| s.state == ConnectionState::Connected)
            .count();
        assert_eq!(table.connected_count(), connected);
        assert_eq!(table.connected_count(), 1);

        let distribution = table.state_counts();
        assert_eq!(distribution.total(), 3);
        assert_eq!(distribution.failed, 1);
        assert_eq!(distribution.connecting, 1);
    }

    #[test]
    fn test_remove() {
        let table = PeerTable::new();
        table.begin_attempt(RelayRecord::seed("10.0.0.1:1000"));

        assert!(table.remove("10.0.0.1:1000").is_some());
        assert!(table.remove("10.0.0.1:1000").is_none());
        assert!(table.is_empty());
        assert_eq!(table.statistics().peers_removed, 1);
    }
}
