//! Worker registry
//!
//! Insertion-ordered and append-only: workers stay registered after they finish so
//! their final status keeps showing up in reports.

use crate::worker::{WorkerHandle, WorkerStatus};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

type Workers = RwLock<Vec<Arc<WorkerHandle>>>;

/// Ordered list of registered workers
#[derive(Debug, Clone, Default)]
pub struct WorkerRegistry {
    workers: Arc<Workers>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a worker handle
    pub fn register(&self, handle: Arc<WorkerHandle>) {
        self.workers.write().push(handle);
    }

    /// Copy of the current registration order
    pub fn snapshot(&self) -> Vec<Arc<WorkerHandle>> {
        self.workers.read().clone()
    }

    /// Status of every registered worker, in registration order
    pub fn statuses(&self) -> Vec<WorkerStatus> {
        self.snapshot().iter().map(|handle| handle.status()).collect()
    }

    pub fn len(&self) -> usize {
        self.workers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.read().is_empty()
    }

    /// Weak view for workers that report on the registry they live in
    pub fn observer(&self) -> RegistryObserver {
        RegistryObserver {
            workers: Arc::downgrade(&self.workers),
        }
    }
}

/// Non-owning view of a `WorkerRegistry`
#[derive(Debug, Clone)]
pub struct RegistryObserver {
    workers: Weak<Workers>,
}

impl RegistryObserver {
    /// Current registration order, or `None` once the registry has been dropped
    pub fn snapshot(&self) -> Option<Vec<Arc<WorkerHandle>>> {
        self.workers.upgrade().map(|workers| workers.read().clone())
    }
}
