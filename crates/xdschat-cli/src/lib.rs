//! XDS chat CLI library
//!
//! This library provides the pieces of the `xdschat` binary: argument parsing,
//! configuration loading, data directory selection and the `ChatApp` composition root
//! with its console.

pub mod app;
pub mod cli;
pub mod config;
pub mod data_dir;
pub mod error;

pub use app::{ChatApp, ConsoleCommand};
pub use cli::{Cli, Commands};
pub use config::{AppConfig, CliConfig};
pub use error::{CliError, Result};
