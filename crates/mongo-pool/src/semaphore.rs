//! Admission gates: a counting semaphore that can also be signaled, and the
//! wait-queue slot counter.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Outcome of waiting on a [`SignalableSemaphore`].
#[derive(Debug)]
pub enum SemaphoreWait {
    /// A permit was taken; dropping it gives the slot back.
    Entered(OwnedSemaphorePermit),
    /// The semaphore was signaled before a permit became available.
    Signaled,
    /// The deadline passed.
    TimedOut,
    /// The caller's token was cancelled.
    Cancelled,
}

/// A counting semaphore with a level-triggered signal.
///
/// While signaled, [`wait_signaled`](Self::wait_signaled) returns
/// [`SemaphoreWait::Signaled`] immediately and wakes current waiters. The
/// pool uses the signal on its capacity gate to turn waiters away after a
/// clear, and on its establishment gate to tell waiters that a dormant
/// connection has become available.
#[derive(Debug)]
pub struct SignalableSemaphore {
    semaphore: Arc<Semaphore>,
    signaled: AtomicBool,
    notify: Notify,
}

impl SignalableSemaphore {
    /// A semaphore with `permits` slots, not signaled.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            signaled: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Free slots.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Whether the signal is set.
    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::SeqCst)
    }

    /// Set the signal and wake every signal-aware waiter.
    pub fn signal(&self) {
        self.signaled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Clear the signal.
    pub fn reset(&self) {
        self.signaled.store(false, Ordering::SeqCst);
    }

    /// Take a slot without waiting.
    pub fn try_enter(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore).try_acquire_owned().ok()
    }

    /// Wait for a slot, ignoring the signal.
    pub async fn wait(&self, deadline: Instant, cancel: &CancellationToken) -> SemaphoreWait {
        tokio::select! {
            biased;
            () = cancel.cancelled() => SemaphoreWait::Cancelled,
            permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                Ok(permit) => SemaphoreWait::Entered(permit),
                Err(_) => SemaphoreWait::Signaled,
            },
            () = tokio::time::sleep_until(deadline) => SemaphoreWait::TimedOut,
        }
    }

    /// Wait for a slot or the signal, whichever comes first.
    pub async fn wait_signaled(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> SemaphoreWait {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before reading the flag so a concurrent `signal` is not missed.
        notified.as_mut().enable();
        if self.is_signaled() {
            return SemaphoreWait::Signaled;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => SemaphoreWait::Cancelled,
            () = &mut notified => SemaphoreWait::Signaled,
            permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                Ok(permit) => SemaphoreWait::Entered(permit),
                Err(_) => SemaphoreWait::Signaled,
            },
            () = tokio::time::sleep_until(deadline) => SemaphoreWait::TimedOut,
        }
    }
}

/// Bounded count of callers waiting for a connection.
#[derive(Debug)]
pub struct WaitQueue {
    free_slots: AtomicUsize,
}

impl WaitQueue {
    /// A queue admitting `size` concurrent waiters.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            free_slots: AtomicUsize::new(size),
        }
    }

    /// Slots not currently held.
    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.free_slots.load(Ordering::SeqCst)
    }

    /// Take a slot, or `None` if the queue is full.
    pub fn try_enter(&self) -> Option<WaitQueueSlot<'_>> {
        self.free_slots
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|_| WaitQueueSlot { queue: self })
    }
}

/// A held wait-queue slot, returned on drop.
#[derive(Debug)]
pub struct WaitQueueSlot<'a> {
    queue: &'a WaitQueue,
}

impl Drop for WaitQueueSlot<'_> {
    fn drop(&mut self) {
        self.queue.free_slots.fetch_add(1, Ordering::SeqCst);
    }
}
