//! Event recording.

use std::sync::Arc;

use parking_lot::Mutex;

/// Collects cloned events; clones share one buffer.
#[derive(Debug)]
pub struct RecordingSubscriber<E> {
    events: Arc<Mutex<Vec<E>>>,
}

impl<E> Clone for RecordingSubscriber<E> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
        }
    }
}

impl<E> Default for RecordingSubscriber<E> {
    fn default() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<E: Clone> RecordingSubscriber<E> {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a copy of `event`.
    pub fn record(&self, event: &E) {
        self.events.lock().push(event.clone());
    }

    /// Everything recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<E> {
        self.events.lock().clone()
    }

    /// Number of recorded events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&E) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    /// Forget everything recorded.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}
