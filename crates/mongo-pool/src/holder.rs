//! Dormant connection storage and the registry of checked-out connections.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use hashbrown::HashMap;
use mongo_protocol::{Connection, ConnectionId, ServiceId};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::events::{EventLogger, PoolEvent, RemovalReason};
use crate::semaphore::SignalableSemaphore;
use crate::service_states::ServiceStates;

/// An established connection owned by the pool.
#[derive(Debug)]
pub(crate) struct PooledConnection {
    connection: Box<dyn Connection>,
    generation: u64,
    service_id: Option<ServiceId>,
    last_used: Instant,
}

impl PooledConnection {
    pub(crate) fn new(
        connection: Box<dyn Connection>,
        generation: u64,
        service_id: Option<ServiceId>,
    ) -> Self {
        Self {
            connection,
            generation,
            service_id,
            last_used: Instant::now(),
        }
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.connection.id()
    }

    fn key(&self) -> u64 {
        self.connection.id().local_value()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn service_id(&self) -> Option<ServiceId> {
        self.service_id
    }

    pub(crate) fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }

    pub(crate) fn connection_mut(&mut self) -> &mut dyn Connection {
        self.connection.as_mut()
    }
}

/// Shared between a checked-out connection's handle and the registry.
#[derive(Debug)]
pub(crate) struct InUseEntry {
    service_id: Option<ServiceId>,
    close_requested: AtomicBool,
    interrupted: AtomicBool,
}

impl InUseEntry {
    pub(crate) fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}

/// Dormant connections (a LIFO stack) and the in-use registry, each behind
/// its own lock.
///
/// The establishment gate is signaled whenever the stack is non-empty so
/// that callers waiting to open a connection try to reuse one instead.
#[derive(Debug)]
pub(crate) struct ConnectionHolder {
    dormant: Mutex<Vec<PooledConnection>>,
    in_use: Mutex<HashMap<u64, Arc<InUseEntry>>>,
    connecting: Arc<SignalableSemaphore>,
    service_states: Arc<ServiceStates>,
    events: Arc<EventLogger>,
    max_idle_time: Option<Duration>,
    removed: AtomicU64,
}

impl ConnectionHolder {
    pub(crate) fn new(
        connecting: Arc<SignalableSemaphore>,
        service_states: Arc<ServiceStates>,
        events: Arc<EventLogger>,
        max_idle_time: Option<Duration>,
    ) -> Self {
        Self {
            dormant: Mutex::new(Vec::new()),
            in_use: Mutex::new(HashMap::new()),
            connecting,
            service_states,
            events,
            max_idle_time,
            removed: AtomicU64::new(0),
        }
    }

    /// Dormant connections.
    pub(crate) fn count(&self) -> usize {
        self.dormant.lock().len()
    }

    /// Connections closed so far.
    pub(crate) fn removed_total(&self) -> u64 {
        self.removed.load(Ordering::Relaxed)
    }

    /// Why `connection` may not be used, if it may not.
    pub(crate) fn removal_reason(
        &self,
        connection: &PooledConnection,
        dormant: bool,
    ) -> Option<RemovalReason> {
        if connection.generation < self.service_states.generation(connection.service_id) {
            return Some(RemovalReason::Stale);
        }
        if connection.connection.is_expired() {
            return Some(RemovalReason::Expired);
        }
        if dormant
            && self
                .max_idle_time
                .is_some_and(|max| connection.last_used.elapsed() >= max)
        {
            return Some(RemovalReason::Idle);
        }
        None
    }

    /// Pop the most recently returned usable connection and mark it in use.
    ///
    /// Unusable connections met on the way are closed.
    pub(crate) fn acquire(&self) -> Option<(PooledConnection, Arc<InUseEntry>)> {
        let mut unusable = Vec::new();
        let found = {
            let mut dormant = self.dormant.lock();
            let mut found = None;
            while let Some(connection) = dormant.pop() {
                match self.removal_reason(&connection, true) {
                    Some(reason) => unusable.push((connection, reason)),
                    None => {
                        found = Some(connection);
                        break;
                    }
                }
            }
            self.signal_or_reset(&dormant);
            found
        };
        for (connection, reason) in unusable {
            self.remove(connection, reason);
        }

        let connection = found?;
        let entry = self.track(&connection);
        // A clear may have landed between the check above and the tracking.
        if let Some(reason) = self.removal_reason(&connection, false) {
            self.untrack(&connection);
            self.remove(connection, reason);
            return None;
        }
        Some((connection, entry))
    }

    /// Put a connection back on the stack.
    pub(crate) fn return_connection(&self, mut connection: PooledConnection) {
        connection.last_used = Instant::now();
        let mut dormant = self.dormant.lock();
        dormant.push(connection);
        self.signal_or_reset(&dormant);
    }

    /// Close a connection that is no longer in the stack.
    pub(crate) fn remove(&self, connection: PooledConnection, reason: RemovalReason) {
        let connection_id = connection.id();
        self.events.publish(PoolEvent::RemovingConnection {
            connection_id,
            reason,
        });
        let started = Instant::now();
        if let Some(service_id) = connection.service_id {
            self.service_states.release_connection(service_id);
        }
        drop(connection);
        self.removed.fetch_add(1, Ordering::Relaxed);
        self.events.publish(PoolEvent::ConnectionRemoved {
            connection_id,
            reason,
            duration: started.elapsed(),
        });
    }

    /// Close every dormant connection.
    pub(crate) fn clear(&self) {
        let drained = {
            let mut dormant = self.dormant.lock();
            let drained = std::mem::take(&mut *dormant);
            self.signal_or_reset(&dormant);
            drained
        };
        for connection in drained {
            self.remove(connection, RemovalReason::PoolClosed);
        }
    }

    /// Close dormant connections that are stale, expired or idle.
    pub(crate) fn prune(&self) -> usize {
        let unusable = {
            let mut dormant = self.dormant.lock();
            let mut unusable = Vec::new();
            let mut kept = Vec::with_capacity(dormant.len());
            for connection in dormant.drain(..) {
                match self.removal_reason(&connection, true) {
                    Some(reason) => unusable.push((connection, reason)),
                    None => kept.push(connection),
                }
            }
            *dormant = kept;
            self.signal_or_reset(&dormant);
            unusable
        };
        let count = unusable.len();
        for (connection, reason) in unusable {
            self.remove(connection, reason);
        }
        count
    }

    /// Register a checked-out connection.
    pub(crate) fn track(&self, connection: &PooledConnection) -> Arc<InUseEntry> {
        let entry = Arc::new(InUseEntry {
            service_id: connection.service_id,
            close_requested: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
        });
        self.in_use.lock().insert(connection.key(), Arc::clone(&entry));
        entry
    }

    /// Forget a checked-out connection.
    pub(crate) fn untrack(&self, connection: &PooledConnection) {
        self.in_use.lock().remove(&connection.key());
    }

    /// Checked-out connections.
    pub(crate) fn in_use_count(&self) -> usize {
        self.in_use.lock().len()
    }

    /// Mark checked-out connections in a scope for interruption.
    ///
    /// `None` marks every connection.
    pub(crate) fn mark_close_in_use(&self, scope: Option<ServiceId>) -> usize {
        let in_use = self.in_use.lock();
        let mut marked = 0;
        for entry in in_use.values() {
            if scope.is_none() || entry.service_id == scope {
                entry.close_requested.store(true, Ordering::SeqCst);
                marked += 1;
            }
        }
        marked
    }

    /// Interrupt every marked connection not interrupted yet.
    pub(crate) fn interrupt_marked(&self) -> usize {
        let in_use = self.in_use.lock();
        in_use
            .values()
            .filter(|entry| entry.close_requested.load(Ordering::SeqCst))
            .filter(|entry| !entry.interrupted.swap(true, Ordering::SeqCst))
            .count()
    }

    fn signal_or_reset(&self, dormant: &[PooledConnection]) {
        if dormant.is_empty() {
            self.connecting.reset();
        } else {
            self.connecting.signal();
        }
    }
}
