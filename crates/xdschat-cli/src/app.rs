//! Main Application Logic
//!
//! `ChatApp` wires the engine together: key vault, coordinator, peer table and relay
//! worker. It prepares the data directory, starts the workers, runs the console until
//! cancellation, and hands over to the coordinator's shutdown sequence.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::Result;
use xdschat_core::{
    ConnectionRegistry, FileStoreInitializer, MasterKeyVault, PeerTable, ProfileOnboardingCheck,
};
use xdschat_runtime::{
    Coordinator, CoordinatorDeps, ProcessExit, RelayConnectionWorker, ShutdownOutcome,
    StartupReport, StdProcessExit, WorkerHandle,
};

// ----------------------------------------------------------------------------
// Console Commands
// ----------------------------------------------------------------------------

/// A line typed at the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Status,
    Peers,
    Destroy,
    Quit,
    Help,
    Empty,
    Unknown(String),
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        match line.trim().to_ascii_lowercase().as_str() {
            "" => ConsoleCommand::Empty,
            "status" => ConsoleCommand::Status,
            "peers" => ConsoleCommand::Peers,
            "destroy" => ConsoleCommand::Destroy,
            "quit" | "exit" => ConsoleCommand::Quit,
            "help" | "?" => ConsoleCommand::Help,
            other => ConsoleCommand::Unknown(other.to_string()),
        }
    }
}

const HELP: &str = "Commands:\n  \
    status   show worker status\n  \
    peers    show relay connections\n  \
    destroy  delete all local data and quit\n  \
    quit     shut down (Ctrl-C works too)\n";

// ----------------------------------------------------------------------------
// Application
// ----------------------------------------------------------------------------

/// Composition root of the chat client
pub struct ChatApp {
    config: AppConfig,
    coordinator: Arc<Coordinator>,
    peers: Arc<PeerTable>,
    relay: Arc<RelayConnectionWorker>,
    relay_handle: Arc<WorkerHandle>,
}

impl ChatApp {
    /// Build the application; the shutdown sequence ends the process
    pub fn new(config: AppConfig, data_dir_root: PathBuf) -> Self {
        Self::with_exit(config, data_dir_root, Arc::new(StdProcessExit))
    }

    /// Build the application with a custom final shutdown step
    pub fn with_exit(config: AppConfig, data_dir_root: PathBuf, exit: Arc<dyn ProcessExit>) -> Self {
        info!(data_dir = %data_dir_root.display(), "Creating XDS chat application");

        let vault = Arc::new(MasterKeyVault::new());
        let coordinator = Coordinator::new(
            CoordinatorDeps {
                vault,
                data_dir_root,
                exit,
            },
            config.coordinator.clone(),
        );

        let peers = Arc::new(PeerTable::new());
        let relay = Arc::new(RelayConnectionWorker::new(
            config.relay.clone(),
            peers.clone(),
        ));
        let relay_handle = coordinator.register_worker(relay.clone());

        Self {
            config,
            coordinator,
            peers,
            relay,
            relay_handle,
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn connections(&self) -> Arc<dyn ConnectionRegistry> {
        self.peers.clone()
    }

    pub fn relay(&self) -> &Arc<RelayConnectionWorker> {
        &self.relay
    }

    pub fn relay_handle(&self) -> &Arc<WorkerHandle> {
        &self.relay_handle
    }

    /// Prepare the data directory and start every registered worker
    pub async fn launch(&self) -> Result<StartupReport> {
        let data_dir_root = self.coordinator.data_dir_root().to_path_buf();
        let store_name = &self.config.store.store_name;

        let onboarding = ProfileOnboardingCheck::new(&data_dir_root, store_name);
        let storage = FileStoreInitializer::new(store_name.clone());
        let onboarding_required = self
            .coordinator
            .prepare_launch(&onboarding, &storage)
            .await?;
        if onboarding_required {
            info!("No profile found, onboarding is required");
        }

        let report = self.coordinator.start_workers().await;
        for status in report.faulted() {
            warn!(worker = %status.name, "Worker is not running");
        }
        Ok(report)
    }

    /// Cancel on Ctrl-C (and SIGTERM on Unix)
    pub fn spawn_signal_handler(&self) {
        let coordinator = self.coordinator.clone();
        let token = coordinator.token();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = shutdown_signal() => {}
            }
            info!("Signal received; requesting shutdown");
            coordinator.cancel();
        });
    }

    /// Run the client on stdin/stdout until shutdown
    ///
    /// A failed launch still goes through the shutdown sequence before the error is
    /// returned.
    pub async fn run(self) -> Result<ShutdownOutcome> {
        self.spawn_signal_handler();
        if let Err(e) = self.launch().await {
            self.coordinator.abort(&format!("launch failed: {}", e));
            self.coordinator.wait_for_shutdown().await;
            return Err(e);
        }

        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();
        self.console(&mut lines, &mut stdout).await?;

        // Input closed without a quit: keep running until a signal arrives.
        self.coordinator.token().cancelled().await;
        Ok(self.coordinator.wait_for_shutdown().await)
    }

    /// Read commands until cancellation, `quit`, or end of input
    pub async fn console<R, W>(&self, lines: &mut Lines<R>, out: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let token = self.coordinator.token();
        out.write_all(b"Type 'help' for commands, Ctrl-C to quit.\n")
            .await?;

        loop {
            out.write_all(self.config.cli.prompt.as_bytes()).await?;
            out.flush().await?;

            let line = tokio::select! {
                _ = token.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                break;
            };

            match ConsoleCommand::parse(&line) {
                ConsoleCommand::Empty => {}
                ConsoleCommand::Status => out.write_all(self.status_text().as_bytes()).await?,
                ConsoleCommand::Peers => out.write_all(self.peers_text().as_bytes()).await?,
                ConsoleCommand::Help => out.write_all(HELP.as_bytes()).await?,
                ConsoleCommand::Unknown(command) => {
                    out.write_all(format!("Unknown command: {}\n", command).as_bytes())
                        .await?
                }
                ConsoleCommand::Quit => {
                    self.coordinator.cancel();
                    break;
                }
                ConsoleCommand::Destroy => {
                    out.write_all(
                        b"This deletes all local data and cannot be undone. Type 'yes' to confirm: ",
                    )
                    .await?;
                    out.flush().await?;
                    let confirmation = tokio::select! {
                        _ = token.cancelled() => break,
                        line = lines.next_line() => line?,
                    };
                    if confirmation.as_deref().map(str::trim) == Some("yes") {
                        self.coordinator.request_self_destruct();
                        self.coordinator.cancel();
                        break;
                    }
                    out.write_all(b"Aborted.\n").await?;
                }
            }
        }

        out.flush().await?;
        Ok(())
    }

    /// One line per registered worker
    pub fn status_text(&self) -> String {
        let mut text = String::new();
        for status in self.coordinator.worker_statuses() {
            text.push_str(&status.to_string());
            text.push('\n');
        }
        text
    }

    /// One line per relay connection plus the connected count
    pub fn peers_text(&self) -> String {
        let mut text = String::new();
        for peer in self.peers.connected_peers() {
            text.push_str(&format!(
                "{} [{}] sent {} received {}",
                peer.address, peer.state, peer.bytes_sent, peer.bytes_received
            ));
            if let Some(error) = &peer.last_error {
                text.push_str(&format!(" last error: {}", error));
            }
            text.push('\n');
        }
        text.push_str(&format!("{} connected\n", self.peers.connected_count()));
        text
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
