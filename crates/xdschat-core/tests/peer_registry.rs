//! Connection registry contract tests
//!
//! Many writers drive connection objects while readers poll snapshots; counters and
//! states must stay consistent throughout.

use std::sync::Arc;
use std::thread;
use xdschat_core::{ConnectionRegistry, ConnectionState, PeerTable, RelayRecord};

#[test]
fn test_concurrent_writers_and_pollers() {
    let table = Arc::new(PeerTable::new());
    let addresses: Vec<String> = (0..8).map(|i| format!("10.0.0.{}:4000", i)).collect();

    let writers: Vec<_> = addresses
        .iter()
        .cloned()
        .map(|address| {
            let table = table.clone();
            thread::spawn(move || {
                let peer = table.begin_attempt(RelayRecord::seed(address));
                peer.transition(ConnectionState::Connected).unwrap();
                for _ in 0..1_000 {
                    peer.record_sent(3);
                    peer.record_received(5);
                }
            })
        })
        .collect();

    let poller = {
        let table = table.clone();
        thread::spawn(move || {
            let mut last_total = 0u64;
            for _ in 0..200 {
                let total: u64 = table
                    .connected_peers()
                    .iter()
                    .map(|peer| peer.bytes_sent + peer.bytes_received)
                    .sum();
                assert!(total >= last_total, "counters went backwards");
                last_total = total;
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    poller.join().unwrap();

    let snapshots = table.connected_peers();
    assert_eq!(snapshots.len(), 8);
    assert!(snapshots.windows(2).all(|w| w[0].address <= w[1].address));
    for snapshot in &snapshots {
        assert_eq!(snapshot.state, ConnectionState::Connected);
        assert_eq!(snapshot.bytes_sent, 3_000);
        assert_eq!(snapshot.bytes_received, 5_000);
    }
    assert_eq!(table.connected_count(), 8);
}

#[test]
fn test_connected_count_matches_connected_snapshots() {
    let table = PeerTable::new();
    let states = [
        ConnectionState::Connected,
        ConnectionState::Failed,
        ConnectionState::Connected,
        ConnectionState::Disconnected,
    ];
    for (i, state) in states.iter().enumerate() {
        let peer = table.begin_attempt(RelayRecord::seed(format!("relay-{}:4000", i)));
        peer.transition(*state).unwrap();
    }
    table.begin_attempt(RelayRecord::seed("relay-9:4000"));

    let connected = table
        .connected_peers()
        .iter()
        .filter(|peer| peer.state == ConnectionState::Connected)
        .count();
    assert_eq!(table.connected_count(), connected);
    assert_eq!(connected, 2);
    assert_eq!(table.state_counts().total(), 5);
}

#[test]
fn test_registry_usable_as_trait_object() {
    let table = Arc::new(PeerTable::new());
    let registry: Arc<dyn ConnectionRegistry> = table.clone();

    let peer = table.begin_attempt(RelayRecord::seed("relay:4000"));
    assert_eq!(registry.connected_count(), 0);
    peer.transition(ConnectionState::Connected).unwrap();
    assert_eq!(registry.connected_count(), 1);
    assert_eq!(registry.connected_peers()[0].relay_id, "relay:4000");
}
