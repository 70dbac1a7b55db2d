//! Configuration types shared by the runtime and the CLI
//!
//! All durations are expressed in milliseconds so the TOML surface stays flat.

use crate::errors::{ChatError, ChatResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ----------------------------------------------------------------------------
// Coordinator Configuration
// ----------------------------------------------------------------------------

/// Timing knobs of the cancellation coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// How long shutdown waits for each worker to finish
    pub shutdown_wait_ms: u64,
    /// Interval between worker status reports
    pub info_interval_ms: u64,
    /// Wait on all workers under one shared deadline instead of one after another
    pub concurrent_shutdown_wait: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            shutdown_wait_ms: 500,
            info_interval_ms: 10_000,
            concurrent_shutdown_wait: false,
        }
    }
}

impl CoordinatorConfig {
    pub fn shutdown_wait(&self) -> Duration {
        Duration::from_millis(self.shutdown_wait_ms)
    }

    pub fn info_interval(&self) -> Duration {
        Duration::from_millis(self.info_interval_ms)
    }

    pub fn validate(&self) -> ChatResult<()> {
        if self.shutdown_wait_ms == 0 {
            return Err(ChatError::Config(
                "shutdown_wait_ms must be greater than 0".to_string(),
            ));
        }
        if self.info_interval_ms == 0 {
            return Err(ChatError::Config(
                "info_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Relay Configuration
// ----------------------------------------------------------------------------

/// Outbound relay connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Seed relays as `host:port`
    pub seed_nodes: Vec<String>,
    /// Maximum number of concurrent outbound connections
    pub max_connections: usize,
    /// Connect timeout per attempt
    pub connect_timeout_ms: u64,
    /// Delay before a failed or closed relay is dialed again
    pub reconnect_delay_ms: u64,
    /// Size of the per-connection read buffer
    pub read_buffer_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            seed_nodes: Vec::new(),
            max_connections: 8,
            connect_timeout_ms: 5_000,
            reconnect_delay_ms: 10_000,
            read_buffer_size: 8192,
        }
    }
}

impl RelayConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn validate(&self) -> ChatResult<()> {
        if self.max_connections == 0 {
            return Err(ChatError::Config(
                "max_connections must be greater than 0".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ChatError::Config(
                "connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(ChatError::Config(
                "reconnect_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(ChatError::Config(
                "read_buffer_size must be greater than 0".to_string(),
            ));
        }
        for node in &self.seed_nodes {
            validate_host_port(node)?;
        }
        Ok(())
    }
}

fn validate_host_port(node: &str) -> ChatResult<()> {
    let (host, port) = node
        .rsplit_once(':')
        .ok_or_else(|| ChatError::Config(format!("Seed node must be host:port: {}", node)))?;
    if host.is_empty() || port.parse::<u16>().map_or(true, |p| p == 0) {
        return Err(ChatError::Config(format!(
            "Seed node must be host:port: {}",
            node
        )));
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Store Configuration
// ----------------------------------------------------------------------------

/// File store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Name of the store directory under the data root
    pub store_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_name: "FStore".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> ChatResult<()> {
        if self.store_name.is_empty() || self.store_name.contains(['/', '\\']) {
            return Err(ChatError::Config(format!(
                "Invalid store name: {:?}",
                self.store_name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(CoordinatorConfig::default().validate().is_ok());
        assert!(RelayConfig::default().validate().is_ok());
        assert!(StoreConfig::default().validate().is_ok());
        assert_eq!(
            CoordinatorConfig::default().shutdown_wait(),
            Duration::from_millis(500)
        );
        assert_eq!(
            CoordinatorConfig::default().info_interval(),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_zero_timings_rejected() {
        let config = CoordinatorConfig {
            shutdown_wait_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RelayConfig {
            connect_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RelayConfig {
            max_connections: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_seed_node_format() {
        let mut config = RelayConfig::default();
        config.seed_nodes = vec!["127.0.0.1:38333".to_string()];
        assert!(config.validate().is_ok());

        for bad in ["127.0.0.1", ":38333", "host:notaport", "host:0"] {
            config.seed_nodes = vec![bad.to_string()];
            assert!(config.validate().is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: CoordinatorConfig = toml::from_str("shutdown_wait_ms = 250").unwrap();
        assert_eq!(config.shutdown_wait_ms, 250);
        assert_eq!(config.info_interval_ms, 10_000);
        assert!(!config.concurrent_shutdown_wait);
    }
}
