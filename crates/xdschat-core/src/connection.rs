//! Relay Connection Model
//!
//! One `ConnectedPeer` exists per live or attempted relay connection. The I/O loop
//! owning the connection advances its state and byte counters; pollers read
//! `PeerSnapshot`s.
//!
//! State machine (per object, forward only):
//!
//! ```text
//! Connecting ──► Connected ──► Disconnected
//!     │              │
//!     ├──────────────┴───────► Failed
//!     └──────────────────────► Disconnected
//! ```
//!
//! Reconnecting never reuses an object; the connection manager creates a fresh
//! `ConnectedPeer` for the next attempt.

use crate::errors::ConnectionError;
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::OnceLock;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Connection State
// ----------------------------------------------------------------------------

/// Lifecycle state of a relay connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Connection attempt in progress
    Connecting,
    /// Socket established and exchanging bytes
    Connected,
    /// Attempt or session ended with an error
    Failed,
    /// Session ended cleanly (remote close or local teardown)
    Disconnected,
}

impl ConnectionState {
    /// Whether `self -> next` is a legal forward transition
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Connected)
                | (Connecting, Failed)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
                | (Connected, Failed)
        )
    }

    /// Failed and Disconnected end the life of a connection object
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Disconnected)
    }

    fn to_u8(self) -> u8 {
        match self {
            ConnectionState::Connecting => 0,
            ConnectionState::Connected => 1,
            ConnectionState::Failed => 2,
            ConnectionState::Disconnected => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Connected,
            2 => ConnectionState::Failed,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Failed => write!(f, "Failed"),
            ConnectionState::Disconnected => write!(f, "Disconnected"),
        }
    }
}

// ----------------------------------------------------------------------------
// Relay Record
// ----------------------------------------------------------------------------

/// Address metadata of a message relay, carried across connection attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRecord {
    pub id: String,
    pub address: String,
    pub last_seen: Option<Timestamp>,
    pub last_error: Option<String>,
}

impl RelayRecord {
    /// Record for a configured seed relay
    pub fn seed(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            id: address.clone(),
            address,
            last_seen: None,
            last_error: None,
        }
    }
}

// ----------------------------------------------------------------------------
// Connected Peer
// ----------------------------------------------------------------------------

/// One live or attempted relay connection
///
/// Shared between the I/O loop (writer) and pollers (readers); all mutation goes
/// through atomics so snapshots never block on the connection.
#[derive(Debug)]
pub struct ConnectedPeer {
    connection_id: Uuid,
    address: String,
    relay: RelayRecord,
    started_at: Timestamp,
    state: AtomicU8,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    /// Millis of the last activity on this object, 0 if none yet
    last_seen: AtomicU64,
    /// Set once, when the connection fails
    error: OnceLock<String>,
}

impl ConnectedPeer {
    /// Start tracking a new connection attempt in the `Connecting` state
    pub fn connecting(relay: RelayRecord) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            address: relay.address.clone(),
            relay,
            started_at: Timestamp::now(),
            state: AtomicU8::new(ConnectionState::Connecting.to_u8()),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            last_seen: AtomicU64::new(0),
            error: OnceLock::new(),
        }
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn relay(&self) -> &RelayRecord {
        &self.relay
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Advance the connection state; backward or repeated transitions are rejected
    pub fn transition(&self, next: ConnectionState) -> Result<ConnectionState, ConnectionError> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let from = ConnectionState::from_u8(current);
            if !from.can_transition_to(next) {
                return Err(ConnectionError::InvalidTransition {
                    address: self.address.clone(),
                    from,
                    to: next,
                });
            }
            match self.state.compare_exchange(
                current,
                next.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if next == ConnectionState::Connected {
                        self.touch();
                    }
                    return Ok(from);
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Move to `Failed`, keeping the reason for pollers
    pub fn fail(&self, reason: impl Into<String>) -> Result<ConnectionState, ConnectionError> {
        let previous = self.transition(ConnectionState::Failed)?;
        let _ = self.error.set(reason.into());
        Ok(previous)
    }

    /// Add to the cumulative bytes-sent counter
    pub fn record_sent(&self, bytes: u64) -> u64 {
        self.touch();
        saturating_add(&self.bytes_sent, bytes)
    }

    /// Add to the cumulative bytes-received counter
    pub fn record_received(&self, bytes: u64) -> u64 {
        self.touch();
        saturating_add(&self.bytes_received, bytes)
    }

    fn touch(&self) {
        self.last_seen
            .fetch_max(Timestamp::now().as_millis(), Ordering::Relaxed);
    }

    /// Last activity on this connection, else the last one recorded for the relay
    pub fn last_seen(&self) -> Option<Timestamp> {
        match self.last_seen.load(Ordering::Relaxed) {
            0 => self.relay.last_seen,
            millis => Some(Timestamp::new(millis)),
        }
    }

    /// Why this connection failed, else the relay's previous error
    pub fn last_error(&self) -> Option<String> {
        self.error
            .get()
            .cloned()
            .or_else(|| self.relay.last_error.clone())
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Copy the current view of this connection
    pub fn snapshot(&self) -> PeerSnapshot {
        PeerSnapshot {
            connection_id: self.connection_id,
            address: self.address.clone(),
            relay_id: self.relay.id.clone(),
            state: self.state(),
            bytes_sent: self.bytes_sent(),
            bytes_received: self.bytes_received(),
            started_at: self.started_at,
            last_seen: self.last_seen(),
            last_error: self.last_error(),
        }
    }
}

fn saturating_add(counter: &AtomicU64, bytes: u64) -> u64 {
    let mut current = counter.load(Ordering::Relaxed);
    loop {
        let next = current.saturating_add(bytes);
        match counter.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => current = actual,
        }
    }
}

/// Point-in-time copy of a `ConnectedPeer`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSnapshot {
    pub connection_id: Uuid,
    pub address: String,
    pub relay_id: String,
    pub state: ConnectionState,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub started_at: Timestamp,
    pub last_seen: Option<Timestamp>,
    pub last_error: Option<String>,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
