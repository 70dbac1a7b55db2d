//! XDS Chat CLI Configuration
//!
//! A single TOML file with one table per concern. Every field has a default, so a
//! file only needs to name what it changes:
//!
//! ```toml
//! [coordinator]
//! shutdown_wait_ms = 1000
//!
//! [relay]
//! seed_nodes = ["relay.example.net:38333"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use xdschat_core::{CoordinatorConfig, RelayConfig, StoreConfig};

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the chat client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Shutdown and status reporting
    pub coordinator: CoordinatorConfig,
    /// Outbound relay connections
    pub relay: RelayConfig,
    /// On-disk store layout
    pub store: StoreConfig,
    /// Console settings
    pub cli: CliConfig,
}

/// Console settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Prompt shown by the console loop
    pub prompt: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            prompt: "xdschat> ".to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Loading & Validation
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load and validate a configuration file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.coordinator.validate()?;
        self.relay.validate()?;
        self.store.validate()?;
        Ok(())
    }

    /// Example configuration file content
    pub fn example_config() -> Result<String> {
        let example = AppConfig {
            relay: RelayConfig {
                seed_nodes: vec![
                    "relay-1.example.net:38333".to_string(),
                    "relay-2.example.net:38333".to_string(),
                ],
                ..RelayConfig::default()
            },
            ..AppConfig::default()
        };
        Ok(toml::to_string_pretty(&example)?)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cli.prompt, "xdschat> ");
        assert_eq!(config.coordinator.shutdown_wait_ms, 500);
        assert_eq!(config.coordinator.info_interval_ms, 10_000);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [coordinator]
            shutdown_wait_ms = 1500

            [relay]
            seed_nodes = ["127.0.0.1:38333"]
            "#,
        )
        .unwrap();

        assert_eq!(config.coordinator.shutdown_wait_ms, 1500);
        assert_eq!(config.coordinator.info_interval_ms, 10_000);
        assert_eq!(config.relay.seed_nodes, vec!["127.0.0.1:38333"]);
        assert_eq!(config.relay.max_connections, 8);
        assert_eq!(config.store.store_name, "FStore");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero_wait = AppConfig::from_toml("[coordinator]\nshutdown_wait_ms = 0\n");
        assert!(matches!(zero_wait, Err(CliError::Core(_))));

        let bad_seed = AppConfig::from_toml("[relay]\nseed_nodes = [\"10.0.0.1\"]\n");
        assert!(matches!(bad_seed, Err(CliError::Core(_))));

        let bad_toml = AppConfig::from_toml("[relay\n");
        assert!(matches!(bad_toml, Err(CliError::TomlParsing(_))));
    }

    #[test]
    fn test_example_config_round_trips() {
        let example = AppConfig::example_config().unwrap();
        assert!(example.contains("[coordinator]"));
        assert!(example.contains("[relay]"));
        assert!(example.contains("[store]"));
        assert!(example.contains("[cli]"));

        let parsed = AppConfig::from_toml(&example).unwrap();
        assert_eq!(parsed.relay.seed_nodes.len(), 2);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xdschat.toml");
        std::fs::write(&path, "[cli]\nprompt = \"> \"\n").unwrap();

        let config = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(config.cli.prompt, "> ");

        let missing = AppConfig::load_from_file(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(CliError::Io(_))));
    }
}
