//! Cancellation Coordinator
//!
//! The single authority for process-wide shutdown. It owns:
//! - the cancellation token every worker observes
//! - the worker registry (with the `InfoWorker` registered at construction)
//! - the self-destruct flag
//! - the shutdown sequence: wait on workers, clear keys, optionally delete the data
//!   directory, exit the process
//!
//! The shutdown sequence is registered on the token when the coordinator is built and
//! runs exactly once, as the last thing the process does.

use crate::exit::{ProcessExit, ShutdownOutcome};
use crate::info::InfoWorker;
use crate::registry::WorkerRegistry;
use crate::worker::{Worker, WorkerHandle, WorkerState, WorkerStatus};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use xdschat_core::{
    ChatError, ChatResult, CoordinatorConfig, KeyVault, OnboardingCheck, StorageInitializer,
    WorkerError,
};

// ----------------------------------------------------------------------------
// Construction
// ----------------------------------------------------------------------------

/// Collaborators the coordinator is built from
pub struct CoordinatorDeps {
    /// Key material wiped during shutdown
    pub vault: Arc<dyn KeyVault>,
    /// Root of everything the client stores on disk
    pub data_dir_root: PathBuf,
    /// Final step of the shutdown sequence
    pub exit: Arc<dyn ProcessExit>,
}

/// Result of `Coordinator::start_workers`
#[derive(Debug, Clone, Default)]
pub struct StartupReport {
    /// Status of every worker started by the call, in registration order
    pub workers: Vec<WorkerStatus>,
}

impl StartupReport {
    pub fn faulted(&self) -> impl Iterator<Item = &WorkerStatus> {
        self.workers
            .iter()
            .filter(|status| status.state == WorkerState::Faulted)
    }

    pub fn all_started(&self) -> bool {
        self.faulted().next().is_none()
    }
}

/// Process-wide cancellation and shutdown coordinator
pub struct Coordinator {
    config: CoordinatorConfig,
    vault: Arc<dyn KeyVault>,
    data_dir_root: PathBuf,
    exit: Arc<dyn ProcessExit>,
    token: CancellationToken,
    self_destruct: AtomicBool,
    aborted: AtomicBool,
    registry: WorkerRegistry,
    info_worker: Arc<WorkerHandle>,
    shutdown_started: AtomicBool,
    outcome: watch::Sender<Option<ShutdownOutcome>>,
}

impl Coordinator {
    /// Build the coordinator and register its shutdown sequence on the token
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(deps: CoordinatorDeps, config: CoordinatorConfig) -> Arc<Self> {
        debug!(data_dir = %deps.data_dir_root.display(), "Creating cancellation coordinator");

        let token = CancellationToken::new();
        let registry = WorkerRegistry::new();

        let info_worker = Arc::new(WorkerHandle::diagnostic(Arc::new(InfoWorker::new(
            registry.observer(),
            config.info_interval(),
        ))));
        registry.register(info_worker.clone());

        let (outcome, _) = watch::channel(None);

        let coordinator = Arc::new(Self {
            config,
            vault: deps.vault,
            data_dir_root: deps.data_dir_root,
            exit: deps.exit,
            token,
            self_destruct: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            registry,
            info_worker,
            shutdown_started: AtomicBool::new(false),
            outcome,
        });

        coordinator.register_shutdown();
        coordinator
    }

    fn register_shutdown(self: &Arc<Self>) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.token.cancelled().await;
            if let Some(outcome) = coordinator.shutdown().await {
                coordinator.exit.exit(outcome.exit_code());
                coordinator.outcome.send_replace(Some(outcome));
            }
        });
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Token observed by every worker; cancelled exactly once
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Ask for the data directory to be deleted during shutdown; cannot be undone
    pub fn request_self_destruct(&self) {
        if !self.self_destruct.swap(true, Ordering::AcqRel) {
            warn!("Self-destruct requested");
        }
    }

    pub fn is_self_destruct_requested(&self) -> bool {
        self.self_destruct.load(Ordering::Acquire)
    }

    pub fn data_dir_root(&self) -> &Path {
        &self.data_dir_root
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    /// Handle of the status reporter registered at construction
    pub fn info_worker(&self) -> &Arc<WorkerHandle> {
        &self.info_worker
    }

    /// Status of every registered worker
    pub fn worker_statuses(&self) -> Vec<WorkerStatus> {
        self.registry.statuses()
    }

    // ------------------------------------------------------------------------
    // Launch
    // ------------------------------------------------------------------------

    /// Prepare the data directory and report whether onboarding is required
    ///
    /// When onboarding is required a pre-existing data directory is a leftover from an
    /// interrupted setup and is deleted before the store is initialized. The directory
    /// is never touched when onboarding is not required.
    pub async fn prepare_launch(
        &self,
        onboarding: &dyn OnboardingCheck,
        storage: &dyn StorageInitializer,
    ) -> ChatResult<bool> {
        if self.token.is_cancelled() {
            return Err(ChatError::Cancelled);
        }

        let required = onboarding.is_onboarding_required().await?;

        if required && tokio::fs::try_exists(&self.data_dir_root).await? {
            warn!(
                data_dir = %self.data_dir_root.display(),
                "Onboarding required, removing existing data directory"
            );
            tokio::fs::remove_dir_all(&self.data_dir_root).await?;
        }

        storage.initialize(&self.data_dir_root).await?;
        info!(onboarding_required = required, "Launch prepared");
        Ok(required)
    }

    // ------------------------------------------------------------------------
    // Workers
    // ------------------------------------------------------------------------

    /// Append a worker to the registry
    ///
    /// Workers registered once shutdown has begun are kept for reporting but are
    /// neither started nor awaited.
    pub fn register_worker(&self, worker: Arc<dyn Worker>) -> Arc<WorkerHandle> {
        let handle = Arc::new(WorkerHandle::new(worker));
        if self.shutdown_started.load(Ordering::Acquire) {
            warn!(worker = %handle.name(), "Worker registered after shutdown began");
        }
        self.registry.register(handle.clone());
        debug!(worker = %handle.name(), id = %handle.id(), "Worker registered");
        handle
    }

    /// Initialize every registered worker that has not been started yet
    ///
    /// Workers start one after another in registration order. A faulted worker is
    /// logged and does not stop the remaining ones. Once cancellation is requested no
    /// further worker is started.
    pub async fn start_workers(&self) -> StartupReport {
        let mut report = StartupReport::default();

        for handle in self.registry.snapshot() {
            if self.token.is_cancelled() {
                warn!(worker = %handle.name(), "Cancellation requested, not starting remaining workers");
                break;
            }
            match handle.initialize(self.token.clone()).await {
                Ok(WorkerState::Faulted) => {
                    error!(
                        worker = %handle.name(),
                        fault = handle.fault().as_deref().unwrap_or("unknown"),
                        "Worker failed to start"
                    );
                }
                Ok(state) => {
                    info!(worker = %handle.name(), %state, "Worker started");
                }
                Err(WorkerError::AlreadyInitialized { .. }) => {
                    debug!(worker = %handle.name(), "Worker already started");
                    continue;
                }
                Err(WorkerError::Cancelled { .. }) => {
                    warn!(worker = %handle.name(), "Cancellation requested, not starting remaining workers");
                    break;
                }
                Err(e) => {
                    error!(worker = %handle.name(), error = %e, "Worker failed to start");
                }
            }
            report.workers.push(handle.status());
        }

        report
    }

    // ------------------------------------------------------------------------
    // Cancellation & Shutdown
    // ------------------------------------------------------------------------

    /// Request cancellation; only the first call has an effect
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            info!("Cancellation requested");
        }
        self.token.cancel();
    }

    /// Cancel because the client cannot keep running
    ///
    /// The shutdown sequence still runs in full, but ends with `Failed` unless
    /// self-destruct was requested.
    pub fn abort(&self, reason: &str) {
        if !self.aborted.swap(true, Ordering::AcqRel) {
            error!(%reason, "Aborting");
        }
        self.cancel();
    }

    /// Resolves with the outcome once the shutdown sequence has finished
    pub async fn wait_for_shutdown(&self) -> ShutdownOutcome {
        let mut outcome = self.outcome.subscribe();
        let finished = match outcome.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => (*outcome).unwrap_or(ShutdownOutcome::Failed),
            Err(_) => ShutdownOutcome::Failed,
        };
        finished
    }

    async fn shutdown(&self) -> Option<ShutdownOutcome> {
        if self.shutdown_started.swap(true, Ordering::AcqRel) {
            return None;
        }

        info!("Application stopping, running shutdown sequence");

        let sequence = AssertUnwindSafe(self.run_shutdown_sequence())
            .catch_unwind()
            .await;
        let outcome = match sequence {
            Ok(Ok(outcome)) => {
                info!(%outcome, "Shutdown sequence finished");
                outcome
            }
            Ok(Err(e)) => {
                error!(error = %e, "Shutdown sequence failed");
                ShutdownOutcome::Failed
            }
            Err(_) => {
                error!("Shutdown sequence panicked");
                ShutdownOutcome::Failed
            }
        };
        Some(outcome)
    }

    async fn run_shutdown_sequence(&self) -> ChatResult<ShutdownOutcome> {
        let workers: Vec<Arc<WorkerHandle>> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|handle| !handle.is_diagnostic() && handle.state().is_started())
            .collect();

        let wait = self.config.shutdown_wait();
        if self.config.concurrent_shutdown_wait {
            let states =
                futures::future::join_all(workers.iter().map(|handle| handle.wait(wait))).await;
            for (handle, state) in workers.iter().zip(states) {
                log_final_status(handle, state);
            }
        } else {
            for handle in &workers {
                let state = handle.wait(wait).await;
                log_final_status(handle, state);
            }
        }

        self.vault.clear_master_random_key()?;
        info!("Master key cleared");

        if self.is_self_destruct_requested() {
            warn!(data_dir = %self.data_dir_root.display(), "Self-destruct: deleting data directory");
            remove_data_dir(&self.data_dir_root).await?;
            info!("Data directory deleted");
            return Ok(ShutdownOutcome::SelfDestructed);
        }

        if self.aborted.load(Ordering::Acquire) {
            return Ok(ShutdownOutcome::Failed);
        }
        Ok(ShutdownOutcome::Completed)
    }
}

fn log_final_status(handle: &WorkerHandle, state: WorkerState) {
    if state.is_terminal() {
        match handle.fault() {
            Some(fault) => warn!(worker = %handle.name(), %state, %fault, "Worker stopped"),
            None => info!(worker = %handle.name(), %state, "Worker stopped"),
        }
    } else {
        warn!(worker = %handle.name(), %state, "Worker did not stop in time, abandoning it");
    }
}

async fn remove_data_dir(path: &Path) -> ChatResult<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(ChatError::Shutdown(format!(
                "failed to delete {}: {}",
                path.display(),
                e
            )))
        }
    }
    if tokio::fs::try_exists(path).await? {
        return Err(ChatError::Shutdown(format!(
            "{} still exists after deletion",
            path.display()
        )));
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use xdschat_core::MasterKeyVault;

    #[derive(Default)]
    struct RecordingExit {
        codes: Mutex<Vec<i32>>,
    }

    impl ProcessExit for RecordingExit {
        fn exit(&self, code: i32) {
            self.codes.lock().push(code);
        }
    }

    fn coordinator(data_dir_root: PathBuf) -> (Arc<Coordinator>, Arc<RecordingExit>) {
        let exit = Arc::new(RecordingExit::default());
        let coordinator = Coordinator::new(
            CoordinatorDeps {
                vault: Arc::new(MasterKeyVault::new()),
                data_dir_root,
                exit: exit.clone(),
            },
            CoordinatorConfig::default(),
        );
        (coordinator, exit)
    }

    #[tokio::test]
    async fn test_info_worker_registered_at_construction() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, _) = coordinator(dir.path().to_path_buf());

        let workers = coordinator.registry().snapshot();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].name(), InfoWorker::NAME);
        assert!(workers[0].is_diagnostic());
        assert!(!coordinator.is_cancellation_requested());
        assert!(!coordinator.is_self_destruct_requested());
        assert_eq!(coordinator.data_dir_root(), dir.path());
    }

    #[tokio::test]
    async fn test_self_destruct_flag_is_one_way() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, _) = coordinator(dir.path().to_path_buf());

        coordinator.request_self_destruct();
        coordinator.request_self_destruct();
        assert!(coordinator.is_self_destruct_requested());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, exit) = coordinator(dir.path().to_path_buf());

        for _ in 0..5 {
            coordinator.cancel();
        }
        assert_eq!(coordinator.wait_for_shutdown().await, ShutdownOutcome::Completed);
        assert_eq!(*exit.codes.lock(), vec![0]);
    }

    #[tokio::test]
    async fn test_abort_runs_shutdown_and_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, exit) = coordinator(dir.path().to_path_buf());

        coordinator.abort("store unavailable");
        assert!(coordinator.is_cancellation_requested());
        assert_eq!(coordinator.wait_for_shutdown().await, ShutdownOutcome::Failed);
        assert_eq!(*exit.codes.lock(), vec![1]);
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_prepare_launch_after_cancel_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join(".xdschat");
        let (coordinator, _) = coordinator(data_dir.clone());
        coordinator.cancel();

        let result = coordinator
            .prepare_launch(
                &xdschat_core::ProfileOnboardingCheck::new(&data_dir, "FStore"),
                &xdschat_core::FileStoreInitializer::new("FStore"),
            )
            .await;
        assert!(matches!(result, Err(ChatError::Cancelled)));
        assert!(!data_dir.exists());
    }

    #[tokio::test]
    async fn test_start_workers_after_cancel_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, _) = coordinator(dir.path().to_path_buf());

        coordinator.cancel();
        let report = coordinator.start_workers().await;
        assert!(report.workers.is_empty());
        assert_eq!(coordinator.info_worker().state(), WorkerState::Created);
    }
}
