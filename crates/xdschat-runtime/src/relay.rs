//! Relay Connection Worker
//!
//! Keeps outbound TCP sessions open to the configured seed relays and feeds every
//! attempt into the shared `PeerTable`. Each relay is maintained by its own task:
//!
//! ```text
//! checkpoint ─► begin_attempt (Connecting) ─► connect w/ timeout ─► Connected ─► pump
//!     ▲                                              │                          │
//!     └────────────── reconnect delay ◄──────────────┴── Failed / Disconnected ◄┘
//! ```
//!
//! Pause takes effect between attempts; an established session keeps pumping until it
//! ends or cancellation is requested. Cancellation also interrupts a write stalled on a
//! relay that stopped reading.

use crate::worker::{Worker, WorkerContext};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use xdschat_core::{
    ChatError, ChatResult, ConnectedPeer, ConnectionError, ConnectionRegistry, ConnectionState,
    PeerTable, RelayConfig, RelayRecord, WorkerError,
};

/// Capacity of the outbound queue and of each session's frame feed
const OUTBOX_CAPACITY: usize = 256;

/// Maintains outbound relay connections
pub struct RelayConnectionWorker {
    config: RelayConfig,
    peers: Arc<PeerTable>,
    outbox: mpsc::Sender<Vec<u8>>,
    outbox_rx: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    targets: Vec<RelayRecord>,
}

impl RelayConnectionWorker {
    pub const NAME: &'static str = "RelayConnectionWorker";

    pub fn new(config: RelayConfig, peers: Arc<PeerTable>) -> Self {
        let (outbox, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);
        let targets = config
            .seed_nodes
            .iter()
            .take(config.max_connections)
            .map(|address| RelayRecord::seed(address.as_str()))
            .collect();

        Self {
            config,
            peers,
            outbox,
            outbox_rx: Mutex::new(Some(outbox_rx)),
            targets,
        }
    }

    /// Queue for outbound frames; each frame is written to every connected relay
    ///
    /// Frames sent while no relay is connected are dropped.
    pub fn outbox(&self) -> mpsc::Sender<Vec<u8>> {
        self.outbox.clone()
    }

    /// Read view over the connections this worker maintains
    pub fn registry(&self) -> Arc<dyn ConnectionRegistry> {
        self.peers.clone()
    }

    /// Relays this worker dials
    pub fn targets(&self) -> &[RelayRecord] {
        &self.targets
    }
}

#[async_trait::async_trait]
impl Worker for RelayConnectionWorker {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self, ctx: WorkerContext) -> ChatResult<()> {
        let mut outbox_rx = self.outbox_rx.lock().take().ok_or_else(|| {
            ChatError::Worker(WorkerError::AlreadyInitialized {
                name: Self::NAME.to_string(),
            })
        })?;

        if self.targets.is_empty() {
            info!("No seed relays configured, waiting for shutdown");
            ctx.cancelled().await;
            return Ok(());
        }

        info!(
            relays = self.targets.len(),
            max_connections = self.config.max_connections,
            "Starting relay connections"
        );

        let (frames, _) = broadcast::channel::<Arc<[u8]>>(OUTBOX_CAPACITY);
        let mut tasks = JoinSet::new();

        {
            let frames = frames.clone();
            let ctx = ctx.clone();
            tasks.spawn(async move {
                loop {
                    tokio::select! {
                        _ = ctx.cancelled() => break,
                        frame = outbox_rx.recv() => match frame {
                            Some(frame) => {
                                if frames.send(Arc::from(frame)).is_err() {
                                    debug!("No relay connected, dropping outbound frame");
                                }
                            }
                            None => break,
                        },
                    }
                }
            });
        }

        for record in &self.targets {
            let session = RelaySession {
                record: record.clone(),
                config: self.config.clone(),
                peers: self.peers.clone(),
                frames: frames.clone(),
            };
            tasks.spawn(session.maintain(ctx.clone()));
        }
        drop(frames);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Relay task ended abnormally");
            }
        }

        debug!("Relay connections stopped");
        Ok(())
    }

    fn info(&self) -> Option<String> {
        Some(format!(
            "{}/{} relays connected",
            self.peers.connected_count(),
            self.targets.len()
        ))
    }
}

// ----------------------------------------------------------------------------
// Per-relay Session Loop
// ----------------------------------------------------------------------------

struct RelaySession {
    record: RelayRecord,
    config: RelayConfig,
    peers: Arc<PeerTable>,
    frames: broadcast::Sender<Arc<[u8]>>,
}

impl RelaySession {
    async fn maintain(mut self, mut ctx: WorkerContext) {
        loop {
            if !ctx.checkpoint().await {
                break;
            }

            let peer = self.peers.begin_attempt(self.record.clone());
            debug!(relay = %peer.address(), id = %peer.connection_id(), "Dialing relay");

            let result = self.connect_and_pump(&peer, &ctx).await;
            self.record.last_seen = peer.last_seen();
            match result {
                Ok(()) => {
                    info!(
                        relay = %peer.address(),
                        sent = peer.bytes_sent(),
                        received = peer.bytes_received(),
                        "Relay session closed"
                    );
                }
                Err(e) => {
                    if peer.state() != ConnectionState::Failed {
                        let _ = peer.fail(e.to_string());
                    }
                    self.record.last_error = peer.last_error();
                    warn!(relay = %peer.address(), error = %e, "Relay session failed");
                }
            }

            if !ctx.sleep(self.config.reconnect_delay()).await {
                break;
            }
        }
    }

    async fn connect_and_pump(
        &self,
        peer: &ConnectedPeer,
        ctx: &WorkerContext,
    ) -> Result<(), ConnectionError> {
        let timeout = self.config.connect_timeout();
        let connect = tokio::select! {
            _ = ctx.cancelled() => {
                peer.transition(ConnectionState::Disconnected)?;
                return Ok(());
            }
            connect = tokio::time::timeout(timeout, TcpStream::connect(peer.address())) => connect,
        };

        let stream = match connect {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                let error = ConnectionError::ConnectFailed {
                    address: peer.address().to_string(),
                    reason: e.to_string(),
                };
                peer.fail(error.to_string())?;
                return Err(error);
            }
            Err(_) => {
                let error = ConnectionError::Timeout {
                    address: peer.address().to_string(),
                    duration_ms: timeout.as_millis() as u64,
                };
                peer.fail(error.to_string())?;
                return Err(error);
            }
        };

        let mut outbound = self.frames.subscribe();
        peer.transition(ConnectionState::Connected)?;
        info!(relay = %peer.address(), "Relay connected");

        let (mut reader, mut writer) = stream.into_split();
        let mut buffer = vec![0u8; self.config.read_buffer_size];

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    let _ = writer.shutdown().await;
                    peer.transition(ConnectionState::Disconnected)?;
                    return Ok(());
                }
                read = reader.read(&mut buffer) => match read {
                    Ok(0) => {
                        peer.transition(ConnectionState::Disconnected)?;
                        return Ok(());
                    }
                    Ok(n) => {
                        peer.record_received(n as u64);
                    }
                    Err(e) => {
                        peer.fail(e.to_string())?;
                        return Err(e.into());
                    }
                },
                frame = outbound.recv() => match frame {
                    Ok(frame) => {
                        tokio::select! {
                            _ = ctx.cancelled() => {
                                debug!(relay = %peer.address(), "Cancelled with a write pending");
                                peer.transition(ConnectionState::Disconnected)?;
                                return Ok(());
                            }
                            written = writer.write_all(&frame) => {
                                if let Err(e) = written {
                                    peer.fail(e.to_string())?;
                                    return Err(e.into());
                                }
                            }
                        }
                        peer.record_sent(frame.len() as u64);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(relay = %peer.address(), skipped, "Relay fell behind, frames dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        peer.transition(ConnectionState::Disconnected)?;
                        return Ok(());
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_capped_by_max_connections() {
        let config = RelayConfig {
            seed_nodes: vec![
                "10.0.0.1:4000".to_string(),
                "10.0.0.2:4000".to_string(),
                "10.0.0.3:4000".to_string(),
            ],
            max_connections: 2,
            ..RelayConfig::default()
        };
        let worker = RelayConnectionWorker::new(config, Arc::new(PeerTable::new()));

        assert_eq!(worker.targets().len(), 2);
        assert_eq!(worker.targets()[0].address, "10.0.0.1:4000");
        assert_eq!(worker.info().as_deref(), Some("0/2 relays connected"));
    }

    #[tokio::test]
    async fn test_no_seeds_waits_for_cancellation() {
        let worker = RelayConnectionWorker::new(RelayConfig::default(), Arc::new(PeerTable::new()));
        let token = tokio_util::sync::CancellationToken::new();
        let ctx = WorkerContext::unpausable(token.clone());

        let run = tokio::spawn(async move { worker.run(ctx).await });
        token.cancel();
        assert!(run.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_run_twice_is_rejected() {
        let worker = RelayConnectionWorker::new(RelayConfig::default(), Arc::new(PeerTable::new()));
        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();

        assert!(worker.run(WorkerContext::unpausable(token.clone())).await.is_ok());
        assert!(worker.run(WorkerContext::unpausable(token)).await.is_err());
    }
}
