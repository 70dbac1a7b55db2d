//! Worker contract and lifecycle handle
//!
//! A `Worker` is one independently running background activity (relay connections,
//! status reporting, ...). The coordinator never drives a worker directly; it goes
//! through the worker's `WorkerHandle`, which owns the lifecycle:
//!
//! ```text
//! Created ──initialize──► Initializing ──► Running ⇄ Paused ──► Completed
//!                              │              │                  Faulted
//!                              ├─ setup error ┴────────────────► Faulted
//!                              └─ cancelled during setup ──────► Completed
//! ```
//!
//! `Completed` and `Faulted` are terminal. Faults are captured on the handle and
//! surfaced by polling; they never propagate into the caller. A worker is never
//! started once cancellation has been requested.

use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;
use xdschat_core::{ChatResult, WorkerError};

// ----------------------------------------------------------------------------
// Worker Trait
// ----------------------------------------------------------------------------

/// A unit of background work driven by the coordinator
///
/// ## Lifecycle
///
/// - `setup()` runs on the caller's task before anything is spawned; an error here is
///   an initialization fault and `run()` is never called
/// - `run()` is spawned onto the tokio runtime and should loop until the context
///   reports cancellation, using `WorkerContext::sleep` for every delay so that
///   cancellation and pause take effect promptly
/// - `info()` may be called from any thread at any time and must not block
#[async_trait::async_trait]
pub trait Worker: Send + Sync + 'static {
    /// Human-readable worker name used in logs
    fn name(&self) -> &str;

    /// Prepare the worker before its activity is spawned
    async fn setup(&self) -> ChatResult<()> {
        Ok(())
    }

    /// The worker's long-running activity
    async fn run(&self, ctx: WorkerContext) -> ChatResult<()>;

    /// Snapshot status text for reporting
    fn info(&self) -> Option<String> {
        None
    }
}

// ----------------------------------------------------------------------------
// Worker Context
// ----------------------------------------------------------------------------

/// Cancellation and pause signals handed to a running worker
#[derive(Debug, Clone)]
pub struct WorkerContext {
    shutdown: CancellationToken,
    paused: watch::Receiver<bool>,
}

impl WorkerContext {
    fn new(shutdown: CancellationToken, paused: watch::Receiver<bool>) -> Self {
        Self { shutdown, paused }
    }

    /// Context that can be cancelled but never paused
    pub fn unpausable(shutdown: CancellationToken) -> Self {
        let (_tx, paused) = watch::channel(false);
        Self { shutdown, paused }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        self.shutdown.cancelled().await
    }

    /// Hold while paused; returns `false` once cancellation has been requested
    pub async fn checkpoint(&mut self) -> bool {
        loop {
            if self.shutdown.is_cancelled() {
                return false;
            }
            if !*self.paused.borrow_and_update() {
                return true;
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                changed = self.paused.changed() => {
                    if changed.is_err() {
                        // Pause signal gone: nobody can resume us, so carry on.
                        return !self.shutdown.is_cancelled();
                    }
                }
            }
        }
    }

    /// Cancellable delay; returns `false` if cancellation interrupted it
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if !self.checkpoint().await {
            return false;
        }
        tokio::select! {
            _ = self.shutdown.cancelled() => return false,
            _ = tokio::time::sleep(duration) => {}
        }
        self.checkpoint().await
    }
}

// ----------------------------------------------------------------------------
// Worker State
// ----------------------------------------------------------------------------

/// Lifecycle state of a registered worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    Created,
    /// `setup()` in progress
    Initializing,
    Running,
    Paused,
    Completed,
    Faulted,
}

impl WorkerState {
    /// Whether the worker has moved past `Created`
    pub fn is_started(self) -> bool {
        self != WorkerState::Created
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Completed | WorkerState::Faulted)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Created => write!(f, "Created"),
            WorkerState::Initializing => write!(f, "Initializing"),
            WorkerState::Running => write!(f, "Running"),
            WorkerState::Paused => write!(f, "Paused"),
            WorkerState::Completed => write!(f, "Completed"),
            WorkerState::Faulted => write!(f, "Faulted"),
        }
    }
}

/// Point-in-time status of a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStatus {
    pub id: Uuid,
    pub name: String,
    pub state: WorkerState,
    pub info: Option<String>,
    pub fault: Option<String>,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.state)?;
        if let Some(info) = &self.info {
            write!(f, " {}", info)?;
        }
        if let Some(fault) = &self.fault {
            write!(f, " fault: {}", fault)?;
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Worker Handle
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct Lifecycle {
    state: WorkerState,
    fault: Option<String>,
}

/// Registry entry owning one worker's lifecycle
pub struct WorkerHandle {
    id: Uuid,
    worker: Arc<dyn Worker>,
    diagnostic: bool,
    initialize_called: AtomicBool,
    lifecycle: Arc<Mutex<Lifecycle>>,
    task: OnceLock<JoinHandle<()>>,
    pause_tx: watch::Sender<bool>,
    finished_tx: Arc<watch::Sender<bool>>,
}

impl WorkerHandle {
    /// Wrap a worker the coordinator waits on during shutdown
    pub fn new(worker: Arc<dyn Worker>) -> Self {
        Self::build(worker, false)
    }

    /// Wrap a reporting worker that shutdown does not wait on
    pub fn diagnostic(worker: Arc<dyn Worker>) -> Self {
        Self::build(worker, true)
    }

    fn build(worker: Arc<dyn Worker>, diagnostic: bool) -> Self {
        let (pause_tx, _) = watch::channel(false);
        let (finished_tx, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            worker,
            diagnostic,
            initialize_called: AtomicBool::new(false),
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                state: WorkerState::Created,
                fault: None,
            })),
            task: OnceLock::new(),
            pause_tx,
            finished_tx: Arc::new(finished_tx),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        self.worker.name()
    }

    /// Diagnostic workers are exempt from the shutdown wait pass
    pub fn is_diagnostic(&self) -> bool {
        self.diagnostic
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.lock().state
    }

    pub fn fault(&self) -> Option<String> {
        self.lifecycle.lock().fault.clone()
    }

    /// Worker status text; never blocks on the worker's activity
    pub fn info(&self) -> Option<String> {
        self.worker.info()
    }

    pub fn status(&self) -> WorkerStatus {
        let (state, fault) = {
            let lifecycle = self.lifecycle.lock();
            (lifecycle.state, lifecycle.fault.clone())
        };
        WorkerStatus {
            id: self.id,
            name: self.name().to_string(),
            state,
            info: self.info(),
            fault,
        }
    }

    /// Whether the spawned activity has finished (false if never spawned)
    pub fn is_finished(&self) -> bool {
        self.task.get().map(|task| task.is_finished()).unwrap_or(false)
    }

    /// Start the worker's activity
    ///
    /// Runs `setup()`, then spawns `run()` and returns without waiting for it. May be
    /// called exactly once; later calls fail with `AlreadyInitialized` and change
    /// nothing. Setup and run faults are captured on the handle, so the returned state
    /// is the only signal of success.
    ///
    /// With `shutdown` already cancelled nothing runs and `Cancelled` is returned. If
    /// cancellation arrives while `setup()` runs, `run()` is never spawned and the
    /// worker ends `Completed`.
    pub async fn initialize(
        &self,
        shutdown: CancellationToken,
    ) -> Result<WorkerState, WorkerError> {
        if self.initialize_called.swap(true, Ordering::AcqRel) {
            return Err(WorkerError::AlreadyInitialized {
                name: self.name().to_string(),
            });
        }

        // Checked under the lifecycle lock: shutdown reads the state after cancelling,
        // so it either sees Initializing or we see the cancellation.
        {
            let mut lifecycle = self.lifecycle.lock();
            if shutdown.is_cancelled() {
                return Err(WorkerError::Cancelled {
                    name: self.name().to_string(),
                });
            }
            lifecycle.state = WorkerState::Initializing;
        }

        let setup = AssertUnwindSafe(self.worker.setup()).catch_unwind().await;
        let setup_fault = match setup {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(
                WorkerError::Setup {
                    name: self.name().to_string(),
                    reason: e.to_string(),
                }
                .to_string(),
            ),
            Err(panic) => Some(
                WorkerError::Panicked {
                    name: self.name().to_string(),
                    reason: panic_message(panic.as_ref()),
                }
                .to_string(),
            ),
        };
        if let Some(fault) = setup_fault {
            warn!(worker = %self.name(), %fault, "Worker setup failed");
            {
                let mut lifecycle = self.lifecycle.lock();
                lifecycle.state = WorkerState::Faulted;
                lifecycle.fault = Some(fault);
            }
            self.finished_tx.send_replace(true);
            return Ok(WorkerState::Faulted);
        }

        {
            let mut lifecycle = self.lifecycle.lock();
            if shutdown.is_cancelled() {
                lifecycle.state = WorkerState::Completed;
                drop(lifecycle);
                debug!(worker = %self.name(), "Cancelled during setup, not running");
                self.finished_tx.send_replace(true);
                return Ok(WorkerState::Completed);
            }
            lifecycle.state = WorkerState::Running;
        }

        let ctx = WorkerContext::new(shutdown, self.pause_tx.subscribe());
        let worker = self.worker.clone();
        let lifecycle = self.lifecycle.clone();
        let finished_tx = self.finished_tx.clone();

        let task = tokio::spawn(async move {
            let name = worker.name().to_string();
            let outcome = AssertUnwindSafe(worker.run(ctx)).catch_unwind().await;
            let fault = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(
                    WorkerError::Run {
                        name: name.clone(),
                        reason: e.to_string(),
                    }
                    .to_string(),
                ),
                Err(panic) => Some(
                    WorkerError::Panicked {
                        name: name.clone(),
                        reason: panic_message(panic.as_ref()),
                    }
                    .to_string(),
                ),
            };
            {
                let mut lifecycle = lifecycle.lock();
                match fault {
                    Some(fault) => {
                        warn!(worker = %name, %fault, "Worker faulted");
                        lifecycle.state = WorkerState::Faulted;
                        lifecycle.fault = Some(fault);
                    }
                    None => {
                        debug!(worker = %name, "Worker completed");
                        lifecycle.state = WorkerState::Completed;
                    }
                }
            }
            finished_tx.send_replace(true);
        });

        // initialize_called guarantees this is the only assignment.
        let _ = self.task.set(task);
        Ok(self.state())
    }

    /// Suspend the worker at its next checkpoint
    pub fn pause(&self) -> Result<(), WorkerError> {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.state {
            WorkerState::Running | WorkerState::Paused => {
                lifecycle.state = WorkerState::Paused;
                self.pause_tx.send_replace(true);
                Ok(())
            }
            state => Err(WorkerError::NotRunning {
                name: self.name().to_string(),
                state: state.to_string(),
            }),
        }
    }

    /// Let a paused worker continue
    pub fn resume(&self) -> Result<(), WorkerError> {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.state {
            WorkerState::Running | WorkerState::Paused => {
                lifecycle.state = WorkerState::Running;
                self.pause_tx.send_replace(false);
                Ok(())
            }
            state => Err(WorkerError::NotRunning {
                name: self.name().to_string(),
                state: state.to_string(),
            }),
        }
    }

    /// Wait up to `timeout` for the activity to finish and report the resulting state
    ///
    /// An activity still running at the deadline is left alone, not aborted.
    pub async fn wait(&self, timeout: Duration) -> WorkerState {
        if self.state().is_started() {
            let mut finished = self.finished_tx.subscribe();
            let _ = tokio::time::timeout(timeout, finished.wait_for(|done| *done)).await;
        }
        self.state()
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("diagnostic", &self.diagnostic)
            .field("state", &self.state())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
