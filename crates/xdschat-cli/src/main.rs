//! XDS chat - terminal client entry point

use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use xdschat_cli::{
    app::ChatApp,
    cli::{Cli, Commands},
    config::AppConfig,
    data_dir::select_data_dir_root,
    error::Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    setup_logging(cli.verbose);

    // Load configuration
    let config = load_configuration(&cli)?;

    match cli.command() {
        Commands::ExampleConfig => {
            print!("{}", AppConfig::example_config()?);
            Ok(())
        }
        Commands::Status { json } => {
            let data_dir = resolve_data_dir(&cli)?;
            print_status(&config, &data_dir, json)
        }
        Commands::Run => {
            let data_dir = resolve_data_dir(&cli)?;
            let app = ChatApp::new(config, data_dir);
            let outcome = app.run().await?;

            // Only reached when the shutdown sequence did not end the process itself.
            info!(%outcome, "XDS chat exited");
            std::process::exit(outcome.exit_code());
        }
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load configuration from file or use defaults
fn load_configuration(cli: &Cli) -> Result<AppConfig> {
    if let Some(config_path) = &cli.config {
        info!("Loading configuration from: {}", config_path);
        AppConfig::load_from_file(config_path)
    } else {
        info!("Using default configuration");
        Ok(AppConfig::default())
    }
}

/// `--data-dir` wins over the default location
fn resolve_data_dir(cli: &Cli) -> Result<PathBuf> {
    match &cli.data_dir {
        Some(data_dir) => Ok(PathBuf::from(data_dir)),
        None => select_data_dir_root(),
    }
}

#[derive(Serialize)]
struct StatusReport<'a> {
    data_dir: String,
    data_dir_exists: bool,
    config: &'a AppConfig,
}

fn print_status(config: &AppConfig, data_dir: &Path, json: bool) -> Result<()> {
    if json {
        let status = StatusReport {
            data_dir: data_dir.display().to_string(),
            data_dir_exists: data_dir.exists(),
            config,
        };
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("Data directory: {}", data_dir.display());
        println!("  exists: {}", data_dir.exists());
        println!();
        print!("{}", toml::to_string_pretty(config)?);
    }
    Ok(())
}
