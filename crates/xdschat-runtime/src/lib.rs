//! XDS Chat Runtime Engine
//!
//! This crate drives the background side of the chat client:
//! - `Worker` / `WorkerHandle`: the contract for background activities and the handle
//!   that owns each one's lifecycle
//! - `WorkerRegistry`: ordered registration of every worker
//! - `InfoWorker`: periodic status reporting
//! - `Coordinator`: process-wide cancellation and the ordered shutdown sequence
//! - `RelayConnectionWorker`: outbound relay connections feeding the peer table
//!
//! `xdschat-core` provides the shared types this engine is built on.

pub mod coordinator;
pub mod exit;
pub mod info;
pub mod registry;
pub mod relay;
pub mod worker;

pub use coordinator::{Coordinator, CoordinatorDeps, StartupReport};
pub use exit::{
    ProcessExit, ShutdownOutcome, StdProcessExit, EXIT_FAILURE, EXIT_OK, EXIT_SELF_DESTRUCT,
};
pub use info::InfoWorker;
pub use registry::{RegistryObserver, WorkerRegistry};
pub use relay::RelayConnectionWorker;
pub use worker::{Worker, WorkerContext, WorkerHandle, WorkerState, WorkerStatus};

// Re-export core types for convenience
pub use xdschat_core::{
    ChatError, ChatResult, ConnectionRegistry, CoordinatorConfig, KeyVault, PeerTable,
    RelayConfig, WorkerError,
};
