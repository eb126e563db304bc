use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use runbox_process::{RunId, RunStatus};
use tokio::{sync::Semaphore, task::JoinHandle};

use crate::process_manager::ProcessManager;

/// Handed back as soon as a spawn is queued. Callers that do not care about
/// the outcome simply drop `task`; the spawn keeps going.
#[derive(Debug)]
pub struct SpawnTicket {
    pub run_id: RunId,
    pub task: JoinHandle<Option<RunStatus>>,
}

/// Runs install + launch off the request path with at most `capacity`
/// spawns in flight. Excess submissions wait for a permit.
#[derive(Clone, Debug)]
pub struct SpawnQueue {
    manager: ProcessManager,
    permits: Arc<Semaphore>,
    capacity: usize,
    pending: Arc<AtomicUsize>,
}

struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SpawnQueue {
    pub fn new(manager: ProcessManager) -> Self {
        let capacity = manager.config().max_concurrent_spawns;
        Self::with_capacity(manager, capacity)
    }

    pub fn with_capacity(manager: ProcessManager, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            manager,
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn submit(&self, filename: impl Into<String>) -> SpawnTicket {
        let filename = filename.into();
        let run_id = self.manager.new_run_id_for(&filename).await;

        self.pending.fetch_add(1, Ordering::SeqCst);
        let guard = PendingGuard(self.pending.clone());
        let manager = self.manager.clone();
        let permits = self.permits.clone();
        let id = run_id.clone();

        tracing::debug!(run_id = %run_id, filename = %filename, "spawn queued");
        let task = tokio::spawn(async move {
            let _guard = guard;
            let Ok(_permit) = permits.acquire_owned().await else {
                return None;
            };
            // Failures are logged (service log and run log) inside spawn.
            manager.spawn(&filename, &id).await.ok()
        });

        SpawnTicket { run_id, task }
    }

    /// Submitted spawns that have not finished yet, waiting or in flight.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
