//! XDS Chat Core
//!
//! Foundational types for the XDS terminal chat client, shared by the runtime engine
//! and the CLI:
//! - Error taxonomy (`ChatError`, `WorkerError`, `ConnectionError`)
//! - Configuration types for the coordinator, relay connections and file store
//! - The relay connection model (`ConnectedPeer`) and the `ConnectionRegistry` contract
//! - Capabilities consumed at launch and shutdown (key vault, onboarding, storage)

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod connection;
pub mod errors;
pub mod launch;
pub mod peers;
pub mod types;
pub mod vault;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{CoordinatorConfig, RelayConfig, StoreConfig};
pub use connection::{ConnectedPeer, ConnectionState, PeerSnapshot, RelayRecord};
pub use errors::{ChatError, ChatResult, ConnectionError, WorkerError};
pub use launch::{
    FileStoreInitializer, OnboardingCheck, ProfileOnboardingCheck, StorageInitializer,
};
pub use peers::{ConnectionRegistry, PeerTable, PeerTableStats, StateDistribution};
pub use types::Timestamp;
pub use vault::{KeyVault, MasterKeyVault};
