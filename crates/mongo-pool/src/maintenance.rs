//! Background pool maintenance.
//!
//! One worker task per pool. It runs a pass as soon as it starts, then waits
//! for either the maintenance interval or an explicit request. Requests made
//! while a pass is running collapse into a single follow-up pass.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::PoolError;

/// Work performed by each maintenance pass.
#[async_trait]
pub trait MaintenanceTarget: Send + Sync + 'static {
    /// Run one pass. Long waits should stop when `cancel` fires.
    async fn run_maintenance(&self, cancel: &CancellationToken) -> Result<(), PoolError>;
}

#[derive(Debug, Default)]
struct Shared {
    wake: Notify,
    spawned: AtomicUsize,
    passes: AtomicU64,
}

#[derive(Debug)]
struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the maintenance worker of a pool.
#[derive(Debug)]
pub struct MaintenanceHelper {
    interval: Duration,
    worker: Mutex<Option<Worker>>,
    shared: Arc<Shared>,
}

impl MaintenanceHelper {
    /// A stopped helper that will run a pass every `interval` once started.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            worker: Mutex::new(None),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Spawn the worker on `runtime` unless it is already running.
    ///
    /// The worker holds `target` weakly and exits once it is gone. Returns
    /// whether a worker was spawned.
    pub fn start(&self, target: Weak<dyn MaintenanceTarget>, runtime: &Handle) -> bool {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(run(
            target,
            Arc::clone(&self.shared),
            self.interval,
            cancel.clone(),
        ));
        self.shared.spawned.fetch_add(1, Ordering::SeqCst);
        *worker = Some(Worker { cancel, handle });
        true
    }

    /// Ask for a pass as soon as possible.
    pub fn request(&self) {
        self.shared.wake.notify_one();
    }

    /// Whether a worker is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Cancel the worker and hand back its task so the caller can await it.
    pub fn stop(&self) -> Option<JoinHandle<()>> {
        let worker = self.worker.lock().take()?;
        worker.cancel.cancel();
        Some(worker.handle)
    }

    /// Workers spawned over the helper's lifetime.
    #[must_use]
    pub fn spawned_workers(&self) -> usize {
        self.shared.spawned.load(Ordering::SeqCst)
    }

    /// Passes completed, successful or not.
    #[must_use]
    pub fn passes(&self) -> u64 {
        self.shared.passes.load(Ordering::SeqCst)
    }
}

impl Drop for MaintenanceHelper {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.cancel.cancel();
        }
    }
}

async fn run(
    target: Weak<dyn MaintenanceTarget>,
    shared: Arc<Shared>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        let Some(pool) = target.upgrade() else {
            break;
        };
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = pool.run_maintenance(&cancel) => result,
        };
        drop(pool);
        shared.passes.fetch_add(1, Ordering::SeqCst);

        // A failed pass waits out the full interval like a successful one.
        if let Err(err) = result {
            tracing::warn!(error = %err, "connection pool maintenance failed");
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = shared.wake.notified() => {}
            () = tokio::time::sleep(interval) => {}
        }
    }
    tracing::debug!("connection pool maintenance stopped");
}
