//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Data directory (defaults to .xdschat next to the executable)
    #[arg(short, long)]
    pub data_dir: Option<String>,
}

impl Cli {
    /// The subcommand to execute; `run` when none was given
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the chat client and its console
    Run,
    /// Show the effective configuration and data directory
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print an example configuration file
    ExampleConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_is_default_command() {
        let cli = Cli::parse_from(["xdschat"]);
        assert_eq!(cli.command(), Commands::Run);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_global_options() {
        let cli = Cli::parse_from([
            "xdschat",
            "--verbose",
            "--config",
            "chat.toml",
            "--data-dir",
            "/tmp/chat",
            "status",
            "--json",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config.as_deref(), Some("chat.toml"));
        assert_eq!(cli.data_dir.as_deref(), Some("/tmp/chat"));
        assert_eq!(cli.command(), Commands::Status { json: true });
    }
}
