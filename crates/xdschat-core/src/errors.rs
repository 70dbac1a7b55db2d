//! Error types for the XDS chat core
//!
//! This module contains the error types shared by the core, runtime and CLI crates:
//! worker lifecycle errors, connection errors, and the `ChatError` type that
//! unifies them.

use crate::connection::ConnectionState;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Worker lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Worker {name} was already initialized")]
    AlreadyInitialized { name: String },
    #[error("Worker {name} is not running (state: {state})")]
    NotRunning { name: String, state: String },
    #[error("Worker {name} failed during setup: {reason}")]
    Setup { name: String, reason: String },
    #[error("Worker {name} failed while running: {reason}")]
    Run { name: String, reason: String },
    #[error("Worker {name} panicked: {reason}")]
    Panicked { name: String, reason: String },
    #[error("Worker {name} not started: cancellation requested")]
    Cancelled { name: String },
}

/// Relay connection errors
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Invalid connection transition for {address}: {from} -> {to}")]
    InvalidTransition {
        address: String,
        from: ConnectionState,
        to: ConnectionState,
    },
    #[error("Connection to {address} failed: {reason}")]
    ConnectFailed { address: String, reason: String },
    #[error("Connection to {address} timed out after {duration_ms}ms")]
    Timeout { address: String, duration_ms: u64 },
    #[error("Connection I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Unified error type for the chat client core
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Key vault error: {0}")]
    Vault(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Shutdown error: {0}")]
    Shutdown(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type for chat core operations
pub type ChatResult<T> = core::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_errors_convert() {
        let err: ChatError = WorkerError::AlreadyInitialized {
            name: "relay".to_string(),
        }
        .into();
        assert!(matches!(err, ChatError::Worker(_)));
        assert_eq!(
            err.to_string(),
            "Worker error: Worker relay was already initialized"
        );
    }

    #[test]
    fn test_transition_error_message() {
        let err = ConnectionError::InvalidTransition {
            address: "127.0.0.1:1".to_string(),
            from: ConnectionState::Failed,
            to: ConnectionState::Connected,
        };
        assert_eq!(
            err.to_string(),
            "Invalid connection transition for 127.0.0.1:1: Failed -> Connected"
        );
    }
}
