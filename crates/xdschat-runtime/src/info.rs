//! Periodic worker status reporter

use crate::registry::RegistryObserver;
use crate::worker::{Worker, WorkerContext};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, warn};
use xdschat_core::ChatResult;

/// Logs the status of every registered worker at a fixed interval
///
/// Registered by the coordinator as a diagnostic worker, so shutdown never waits on
/// it and its reports keep flowing until the process exits.
pub struct InfoWorker {
    registry: RegistryObserver,
    interval: Duration,
    reports: AtomicU64,
    last_report: Mutex<Option<String>>,
}

impl InfoWorker {
    pub const NAME: &'static str = "InfoWorker";

    pub fn new(registry: RegistryObserver, interval: Duration) -> Self {
        Self {
            registry,
            interval,
            reports: AtomicU64::new(0),
            last_report: Mutex::new(None),
        }
    }

    /// Number of reports written so far
    pub fn reports(&self) -> u64 {
        self.reports.load(Ordering::Relaxed)
    }

    /// Text of the most recent report, one line per worker
    pub fn last_report(&self) -> Option<String> {
        self.last_report.lock().clone()
    }

    fn report(&self) -> bool {
        let Some(workers) = self.registry.snapshot() else {
            return false;
        };

        let mut text = String::new();
        for handle in workers {
            let status = handle.status();
            text.push_str(&status.to_string());
            text.push('\n');
            let details = status.info.as_deref().unwrap_or("-");
            match &status.fault {
                Some(fault) => warn!(
                    worker = %status.name,
                    state = %status.state,
                    info = %details,
                    %fault,
                    "Worker status"
                ),
                None => info!(
                    worker = %status.name,
                    state = %status.state,
                    info = %details,
                    "Worker status"
                ),
            }
        }

        *self.last_report.lock() = Some(text);
        self.reports.fetch_add(1, Ordering::Relaxed);
        true
    }
}

#[async_trait::async_trait]
impl Worker for InfoWorker {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self, mut ctx: WorkerContext) -> ChatResult<()> {
        while ctx.sleep(self.interval).await {
            if !self.report() {
                break;
            }
        }
        Ok(())
    }

    fn info(&self) -> Option<String> {
        Some(format!(
            "{} reports every {}ms",
            self.reports(),
            self.interval.as_millis()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::WorkerRegistry;
    use crate::worker::{WorkerHandle, WorkerState};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use xdschat_core::ChatError;

    /// Runs for a while, then fails
    struct FlakyWorker;

    #[async_trait::async_trait]
    impl Worker for FlakyWorker {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn run(&self, mut ctx: WorkerContext) -> ChatResult<()> {
            ctx.sleep(Duration::from_secs(15)).await;
            Err(ChatError::Storage("table locked".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_each_interval_until_cancelled() {
        let registry = WorkerRegistry::new();
        let info = Arc::new(InfoWorker::new(
            registry.observer(),
            Duration::from_secs(10),
        ));
        let handle = Arc::new(WorkerHandle::diagnostic(info.clone()));
        registry.register(handle.clone());

        let token = CancellationToken::new();
        handle.initialize(token.clone()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(info.reports(), 3);

        token.cancel();
        assert_eq!(
            handle.wait(Duration::from_millis(100)).await,
            WorkerState::Completed
        );
        assert_eq!(info.reports(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_fault_shows_in_next_report() {
        let registry = WorkerRegistry::new();
        let info = Arc::new(InfoWorker::new(
            registry.observer(),
            Duration::from_secs(10),
        ));
        let info_handle = Arc::new(WorkerHandle::diagnostic(info.clone()));
        let flaky = Arc::new(WorkerHandle::new(Arc::new(FlakyWorker)));
        registry.register(info_handle.clone());
        registry.register(flaky.clone());

        let token = CancellationToken::new();
        info_handle.initialize(token.clone()).await.unwrap();
        flaky.initialize(token.clone()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;
        let first = info.last_report().unwrap();
        assert!(first.contains("flaky [Running]"), "{}", first);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(flaky.state(), WorkerState::Faulted);
        let second = info.last_report().unwrap();
        assert!(second.contains("flaky [Faulted]"), "{}", second);
        assert!(second.contains("table locked"), "{}", second);
        assert!(second.contains("InfoWorker [Running]"), "{}", second);

        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_registry_dropped() {
        let registry = WorkerRegistry::new();
        let info = Arc::new(InfoWorker::new(registry.observer(), Duration::from_secs(1)));
        let handle = WorkerHandle::diagnostic(info.clone());
        drop(registry);

        handle.initialize(CancellationToken::new()).await.unwrap();
        assert_eq!(
            handle.wait(Duration::from_secs(5)).await,
            WorkerState::Completed
        );
        assert_eq!(info.reports(), 0);
    }
}
