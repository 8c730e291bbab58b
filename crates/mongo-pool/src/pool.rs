//! Connection pool implementation.
//!
//! This module provides an exclusive connection pool for one MongoDB server:
//! every connection is handed to a single caller at a time, opened and
//! authenticated on demand, and invalidated in bulk by generation bumps.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use mongo_auth::ConnectionInitializer;
use mongo_protocol::{
    CancellationToken, Connection, ConnectionDescription, ConnectionFactory, Endpoint, ServerId,
    ServiceId,
};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::Instant;

use crate::checkout_reason::{CheckOutReason, CheckOutReasonCounter};
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::events::{EventLogger, EventSubscriber, PoolEvent, RemovalReason};
use crate::handle::ConnectionHandle;
use crate::holder::{ConnectionHolder, InUseEntry, PooledConnection};
use crate::lifecycle::ConnectionExceptionHandler;
use crate::maintenance::{MaintenanceHelper, MaintenanceTarget};
use crate::semaphore::{SemaphoreWait, SignalableSemaphore, WaitQueue};
use crate::service_states::ServiceStates;
use crate::state::{PoolState, State};

/// How long a maintenance top-up waits for pool capacity before giving the
/// slot to foreground callers.
const MIN_SIZE_WAIT: Duration = Duration::from_millis(20);

/// A connection pool for one MongoDB server.
///
/// The pool hands out exclusive [`ConnectionHandle`]s. New connections are
/// opened and authenticated on demand, at most `max_connecting` at a time,
/// and a background task keeps the pool at `min_connections` and closes
/// stale or idle connections.
///
/// # Features
///
/// - Bounded capacity, establishment concurrency and wait queue
/// - Pause on clear with generation-based invalidation
/// - Per-service generations in load-balanced mode
/// - Cursor and transaction pinning counters for timeout diagnostics
/// - Lifecycle events and checkout metrics
///
/// # Example
///
/// ```rust,ignore
/// use mongo_driver_pool::{ConnectionPool, PoolConfig};
///
/// let pool = ConnectionPool::builder()
///     .server_id(server_id)
///     .factory(factory)
///     .min_connections(2)
///     .max_connections(20)
///     .build()?;
///
/// pool.initialize()?;
/// pool.set_ready()?;
///
/// let conn = pool.acquire_connection(&CancellationToken::new()).await?;
/// // Use connection...
/// ```
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

pub(crate) struct PoolInner {
    config: PoolConfig,
    server_id: ServerId,
    endpoint: Endpoint,
    factory: Arc<dyn ConnectionFactory>,
    initializer: ConnectionInitializer,
    events: Arc<EventLogger>,
    exception_handler: Option<Arc<dyn ConnectionExceptionHandler>>,
    state: Mutex<PoolState>,
    service_states: Arc<ServiceStates>,
    checkout_reasons: CheckOutReasonCounter,
    /// Capacity gate, signaled while the pool is paused or closed.
    max_connections: SignalableSemaphore,
    /// Establishment gate, signaled while dormant connections exist.
    max_connecting: Arc<SignalableSemaphore>,
    wait_queue: WaitQueue,
    holder: ConnectionHolder,
    maintenance: MaintenanceHelper,
    pending: AtomicUsize,
    runtime: Handle,
    created_at: Instant,
    metrics: Mutex<PoolMetricsInner>,
}

/// Internal metrics tracking.
#[derive(Debug, Default)]
struct PoolMetricsInner {
    /// Total connections established.
    connections_created: u64,
    /// Total successful checkouts.
    checkouts_successful: u64,
    /// Total failed checkouts.
    checkouts_failed: u64,
}

/// Decrements the pending counter on drop.
struct PendingGuard<'a>(&'a AtomicUsize);

impl<'a> PendingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

type Checkout = (PooledConnection, Arc<InUseEntry>, OwnedSemaphorePermit);

impl ConnectionPool {
    /// Create a new pool builder.
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Move the pool out of the uninitialized state; it starts paused.
    pub fn initialize(&self) -> Result<(), PoolError> {
        {
            let mut state = self.inner.state.lock();
            state.ensure_not_disposed()?;
            if state.state() != State::Uninitialized {
                return Err(PoolError::InvalidOperation(
                    "ConnectionPool is already initialized.".into(),
                ));
            }
            state.transition(State::Paused)?;
        }
        self.inner.events.publish(PoolEvent::PoolOpening);
        self.inner.events.publish(PoolEvent::PoolOpened);
        Ok(())
    }

    /// Allow checkouts and start background maintenance.
    ///
    /// Calling it on a ready pool does nothing.
    pub fn set_ready(&self) -> Result<(), PoolError> {
        self.make_ready(State::Ready)
    }

    /// Like [`set_ready`](Self::set_ready), but global clears no longer pause
    /// the pool. Used in load-balanced mode.
    pub fn set_ready_non_pausable(&self) -> Result<(), PoolError> {
        self.make_ready(State::ReadyNonPausable)
    }

    fn make_ready(&self, target: State) -> Result<(), PoolError> {
        let inner = &self.inner;
        {
            let mut state = inner.state.lock();
            if !state.transition(target)? {
                return Ok(());
            }
            inner.max_connections.reset();
            let weak: Weak<PoolInner> = Arc::downgrade(inner);
            let weak: Weak<dyn MaintenanceTarget> = weak;
            if !inner.maintenance.start(weak, &inner.runtime) {
                inner.maintenance.request();
            }
        }
        inner.events.publish(PoolEvent::PoolReady);
        Ok(())
    }

    /// Invalidate connections.
    ///
    /// With a service id, only connections bound to that service become
    /// stale. Without one, every connection becomes stale and, unless the
    /// pool is non-pausable, the pool pauses and waiting callers fail. With
    /// `close_in_use`, checked-out connections in scope are interrupted by
    /// the next maintenance pass and closed on check-in.
    pub fn clear(&self, service_id: Option<ServiceId>, close_in_use: bool) -> Result<(), PoolError> {
        let inner = &self.inner;
        let cleared = {
            let mut state = inner.state.lock();
            state.ensure_not_disposed()?;
            state.ensure_initialized()?;
            match service_id {
                Some(_) => {
                    inner.service_states.increment_generation(service_id);
                    true
                }
                None if state.state() == State::ReadyNonPausable => {
                    inner.service_states.increment_generation(None);
                    true
                }
                None => {
                    let paused = state.transition(State::Paused)?;
                    if paused {
                        inner.service_states.increment_generation(None);
                        inner.max_connections.signal();
                    }
                    paused
                }
            }
        };

        if cleared {
            if close_in_use {
                inner.holder.mark_close_in_use(service_id);
            }
            inner.maintenance.request();
            inner.events.publish(PoolEvent::PoolCleared {
                service_id,
                close_in_use,
            });
        }
        Ok(())
    }

    /// Check out a connection.
    ///
    /// Reuses the most recently returned connection if one is usable,
    /// otherwise opens a new one. Fails if the pool is not ready, the wait
    /// queue is full, the wait queue timeout elapses, or `cancel` fires.
    pub async fn acquire_connection(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ConnectionHandle, PoolError> {
        self.acquire(None, cancel).await
    }

    /// Check out a connection pinned to a cursor or transaction.
    pub async fn acquire_connection_for(
        &self,
        reason: CheckOutReason,
        cancel: &CancellationToken,
    ) -> Result<ConnectionHandle, PoolError> {
        self.acquire(Some(reason), cancel).await
    }

    /// Check out a connection from synchronous code.
    ///
    /// Drives the checkout on the runtime the pool was built on, with the
    /// same timeout and cancellation behavior as
    /// [`acquire_connection`](Self::acquire_connection). Must not be called
    /// from within an async context; use `spawn_blocking` there.
    pub fn acquire_connection_blocking(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ConnectionHandle, PoolError> {
        self.inner.runtime.block_on(self.acquire(None, cancel))
    }

    async fn acquire(
        &self,
        reason: Option<CheckOutReason>,
        cancel: &CancellationToken,
    ) -> Result<ConnectionHandle, PoolError> {
        let inner = &self.inner;
        inner.events.publish(PoolEvent::CheckingOut);
        let started = Instant::now();

        match inner.checkout(started, cancel).await {
            Ok((connection, entry, permit)) => {
                let connection_id = connection.id();
                let mut handle = ConnectionHandle::new(connection, entry, Arc::clone(inner), permit);
                if let Some(reason) = reason {
                    handle.set_check_out_reason_if_not_already_set(reason);
                }
                inner.metrics.lock().checkouts_successful += 1;
                inner.events.publish(PoolEvent::CheckedOut {
                    connection_id,
                    duration: started.elapsed(),
                });
                Ok(handle)
            }
            Err(err) => {
                inner.metrics.lock().checkouts_failed += 1;
                inner.events.publish(PoolEvent::CheckingOutFailed {
                    reason: err.checkout_failed_reason(),
                    duration: started.elapsed(),
                });
                Err(err)
            }
        }
    }

    /// Close the pool and every dormant connection.
    ///
    /// Waiting callers fail, checked-out connections are closed when they
    /// are returned, and the maintenance task is awaited. Disposing twice
    /// does nothing.
    pub async fn dispose(&self) {
        let inner = &self.inner;
        let worker = {
            let mut state = inner.state.lock();
            if !matches!(state.transition(State::Disposed), Ok(true)) {
                return;
            }
            inner.maintenance.stop()
        };

        inner.events.publish(PoolEvent::PoolClosing);
        inner.max_connections.signal();
        inner.max_connecting.signal();
        inner.holder.clear();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                tracing::warn!(server_id = %inner.server_id, error = %err, "maintenance task failed");
            }
        }
        inner.events.publish(PoolEvent::PoolClosed);
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> State {
        self.inner.state.lock().state()
    }

    /// Server this pool connects to.
    #[must_use]
    pub fn server_id(&self) -> &ServerId {
        &self.inner.server_id
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Capacity not currently checked out.
    #[must_use]
    pub fn available_count(&self) -> usize {
        self.inner.max_connections.available()
    }

    /// Connections checked out, including checkouts still establishing.
    #[must_use]
    pub fn used_count(&self) -> usize {
        self.inner.used_count()
    }

    /// Connections parked in the pool.
    #[must_use]
    pub fn dormant_count(&self) -> usize {
        self.inner.holder.count()
    }

    /// Used plus dormant connections.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.inner.created_count()
    }

    /// Connections being opened and authenticated.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// The pool-wide generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.service_states.global_generation()
    }

    /// Generation of one service, zero if the service is unknown.
    #[must_use]
    pub fn service_generation(&self, service_id: ServiceId) -> u64 {
        self.inner.service_states.generation(Some(service_id))
    }

    /// Live connections bound to a service.
    #[must_use]
    pub fn service_connection_count(&self, service_id: ServiceId) -> usize {
        self.inner
            .service_states
            .connection_count(service_id)
            .unwrap_or(0)
    }

    /// Unused wait queue slots.
    #[must_use]
    pub fn wait_queue_free_slots(&self) -> usize {
        self.inner.wait_queue.free_slots()
    }

    /// Connections currently pinned for `reason`.
    #[must_use]
    pub fn check_outs_count(&self, reason: CheckOutReason) -> usize {
        self.inner.checkout_reasons.count(reason)
    }

    /// Maintenance tasks spawned so far.
    #[must_use]
    pub fn maintenance_workers_spawned(&self) -> usize {
        self.inner.maintenance.spawned_workers()
    }

    /// Maintenance passes completed so far.
    #[must_use]
    pub fn maintenance_passes(&self) -> u64 {
        self.inner.maintenance.passes()
    }

    /// Whether the maintenance task is running.
    #[must_use]
    pub fn is_maintenance_running(&self) -> bool {
        self.inner.maintenance.is_running()
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let in_use = self.used_count();
        let available = self.dormant_count();
        PoolStatus {
            available,
            in_use,
            total: in_use + available,
            max: self.inner.config.max_connections,
            pending: self.pending_count(),
            generation: self.generation(),
        }
    }

    /// Get pool metrics.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let inner = self.inner.metrics.lock();
        PoolMetrics {
            connections_created: inner.connections_created,
            connections_closed: self.inner.holder.removed_total(),
            checkouts_successful: inner.checkouts_successful,
            checkouts_failed: inner.checkouts_failed,
            uptime: self.inner.created_at.elapsed(),
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("server_id", &self.inner.server_id)
            .field("state", &self.state())
            .field("created", &self.created_count())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl PoolInner {
    pub(crate) fn checkout_reasons(&self) -> &CheckOutReasonCounter {
        &self.checkout_reasons
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.state.lock().is_disposed()
    }

    pub(crate) fn is_unusable(&self, connection: &PooledConnection) -> bool {
        self.holder.removal_reason(connection, false).is_some()
    }

    fn used_count(&self) -> usize {
        self.config
            .max_connections
            .saturating_sub(self.max_connections.available())
    }

    fn created_count(&self) -> usize {
        self.used_count() + self.holder.count()
    }

    async fn checkout(
        &self,
        started: Instant,
        cancel: &CancellationToken,
    ) -> Result<Checkout, PoolError> {
        self.state.lock().ensure_ready()?;
        let _slot = self
            .wait_queue
            .try_enter()
            .ok_or_else(|| PoolError::WaitQueueFull {
                pool: self.endpoint.to_string(),
            })?;

        let deadline = started + self.config.wait_queue_timeout;
        let permit = match self.max_connections.wait_signaled(deadline, cancel).await {
            SemaphoreWait::Entered(permit) => permit,
            SemaphoreWait::Signaled => return Err(self.not_ready_error()),
            SemaphoreWait::TimedOut => return Err(self.timeout_error(started.elapsed(), None)),
            SemaphoreWait::Cancelled => return Err(PoolError::Cancelled),
        };

        let (connection, entry) = self
            .create_opened_or_reuse(started, deadline, cancel)
            .await?;
        Ok((connection, entry, permit))
    }

    async fn create_opened_or_reuse(
        &self,
        started: Instant,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<(PooledConnection, Arc<InUseEntry>), PoolError> {
        if Instant::now() >= deadline {
            return Err(self.timeout_error(started.elapsed(), None));
        }

        let connecting_started = Instant::now();
        let mut reused = self.holder.acquire();
        loop {
            if let Some(found) = reused {
                return Ok(found);
            }
            self.state.lock().ensure_ready()?;

            reused = match self.max_connecting.wait_signaled(deadline, cancel).await {
                SemaphoreWait::Signaled => self.holder.acquire(),
                SemaphoreWait::Entered(connecting) => {
                    let connection = self.create_opened(cancel).await?;
                    drop(connecting);
                    let entry = self.holder.track(&connection);
                    return Ok((connection, entry));
                }
                SemaphoreWait::TimedOut => {
                    let elapsed = connecting_started.elapsed();
                    return Err(self.timeout_error(
                        elapsed,
                        Some(format!(
                            "Timed out waiting in connecting queue after {}ms.",
                            elapsed.as_millis()
                        )),
                    ));
                }
                SemaphoreWait::Cancelled => return Err(PoolError::Cancelled),
            };
        }
    }

    /// Open, handshake and authenticate a new connection.
    async fn create_opened(&self, cancel: &CancellationToken) -> Result<PooledConnection, PoolError> {
        self.events.publish(PoolEvent::AddingConnection);
        let _pending = PendingGuard::enter(&self.pending);
        let started = Instant::now();
        let generation = self.service_states.global_generation();

        let mut connection = self
            .factory
            .create_connection(&self.server_id, &self.endpoint);
        match self.establish(connection.as_mut(), cancel).await {
            Ok(description) => {
                let service_id = description.service_id();
                let generation = match service_id {
                    Some(service_id) => self.service_states.register_connection(service_id),
                    None => generation,
                };
                let connection_id = connection.id();
                self.metrics.lock().connections_created += 1;
                self.events.publish(PoolEvent::ConnectionAdded {
                    connection_id,
                    duration: started.elapsed(),
                });
                Ok(PooledConnection::new(connection, generation, service_id))
            }
            Err(PoolError::Cancelled) => Err(PoolError::Cancelled),
            Err(err) => {
                drop(connection);
                tracing::warn!(
                    server_id = %self.server_id,
                    error = %err,
                    "failed to establish connection"
                );
                if let Some(handler) = &self.exception_handler {
                    handler.handle_exception_on_open(&err);
                }
                Err(err)
            }
        }
    }

    async fn establish(
        &self,
        connection: &mut dyn Connection,
        cancel: &CancellationToken,
    ) -> Result<ConnectionDescription, PoolError> {
        connection.open(cancel).await?;
        Ok(self.initializer.handshake(connection, cancel).await?)
    }

    /// Return a connection from a dropped handle.
    pub(crate) fn check_in(
        &self,
        connection: PooledConnection,
        entry: &InUseEntry,
        reason: Option<CheckOutReason>,
    ) {
        let connection_id = connection.id();
        self.holder.untrack(&connection);
        if let Some(reason) = reason {
            self.checkout_reasons.decrement(reason);
        }

        if self.is_disposed() {
            self.holder.remove(connection, RemovalReason::PoolClosed);
            return;
        }

        self.events.publish(PoolEvent::CheckingIn { connection_id });
        let started = Instant::now();
        let removal = if entry.is_interrupted() {
            Some(RemovalReason::Interrupted)
        } else {
            self.holder.removal_reason(&connection, false)
        };
        match removal {
            Some(reason) => self.holder.remove(connection, reason),
            None => {
                self.holder.return_connection(connection);
                // Dispose may have drained the holder while we were returning.
                if self.is_disposed() {
                    self.holder.clear();
                }
            }
        }
        self.events.publish(PoolEvent::CheckedIn {
            connection_id,
            duration: started.elapsed(),
        });
    }

    fn not_ready_error(&self) -> PoolError {
        match self.state.lock().ensure_ready() {
            Err(err) => err,
            Ok(()) => PoolError::Paused {
                endpoint: self.endpoint.to_string(),
            },
        }
    }

    fn timeout_error(&self, elapsed: Duration, message: Option<String>) -> PoolError {
        let ms = elapsed.as_millis();
        let cursors = self.checkout_reasons.count(CheckOutReason::Cursor);
        let transactions = self.checkout_reasons.count(CheckOutReason::Transaction);

        let message = if cursors != 0 || transactions != 0 {
            let max = self.config.max_connections;
            let others = self.used_count().saturating_sub(cursors + transactions);
            format!(
                "Timed out after {ms}ms waiting for a connection from the connection pool. \
                 maxPoolSize: {max}, connections in use by cursors: {cursors}, \
                 connections in use by transactions: {transactions}, \
                 connections in use by other operations: {others}."
            )
        } else {
            message.unwrap_or_else(|| format!("Timed out waiting for a connection after {ms}ms."))
        };
        PoolError::Timeout { message }
    }

    async fn ensure_min_size(&self, cancel: &CancellationToken) -> Result<(), PoolError> {
        while self.created_count() < self.config.min_connections {
            let deadline = Instant::now() + MIN_SIZE_WAIT;
            let permit = match self.max_connections.wait_signaled(deadline, cancel).await {
                SemaphoreWait::Entered(permit) => permit,
                _ => return Ok(()),
            };
            let connecting = match self.max_connecting.wait(deadline, cancel).await {
                SemaphoreWait::Entered(connecting) => connecting,
                SemaphoreWait::Cancelled => return Ok(()),
                _ => {
                    return Err(self.timeout_error(
                        MIN_SIZE_WAIT,
                        Some(format!(
                            "Timed out waiting in connecting queue after {}ms.",
                            MIN_SIZE_WAIT.as_millis()
                        )),
                    ));
                }
            };
            self.state.lock().ensure_ready()?;

            let connection = self.create_opened(cancel).await?;
            self.holder.return_connection(connection);
            drop(connecting);
            drop(permit);
        }
        Ok(())
    }
}

#[async_trait]
impl MaintenanceTarget for PoolInner {
    async fn run_maintenance(&self, cancel: &CancellationToken) -> Result<(), PoolError> {
        let interrupted = self.holder.interrupt_marked();
        let pruned = self.holder.prune();
        let ready = self.state.lock().state().is_ready();
        if ready {
            self.ensure_min_size(cancel).await?;
        }
        tracing::trace!(
            server_id = %self.server_id,
            interrupted,
            pruned,
            created = self.created_count(),
            "connection pool maintenance pass"
        );
        Ok(())
    }
}

/// Builder for creating a connection pool.
///
/// # Example
///
/// ```rust,ignore
/// let pool = ConnectionPool::builder()
///     .server_id(server_id)
///     .factory(Arc::new(factory))
///     .initializer(ConnectionInitializer::new().with_authenticator_factory(auth))
///     .pool_config(pool_config)
///     .build()?;
/// ```
pub struct PoolBuilder {
    config: PoolConfig,
    server_id: Option<ServerId>,
    factory: Option<Arc<dyn ConnectionFactory>>,
    initializer: ConnectionInitializer,
    subscriber: Option<Arc<dyn EventSubscriber>>,
    exception_handler: Option<Arc<dyn ConnectionExceptionHandler>>,
    runtime: Option<Handle>,
}

impl PoolBuilder {
    /// Create a new pool builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PoolConfig::default(),
            server_id: None,
            factory: None,
            initializer: ConnectionInitializer::new(),
            subscriber: None,
            exception_handler: None,
            runtime: None,
        }
    }

    /// Set the pool configuration.
    #[must_use]
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the minimum number of connections.
    #[must_use]
    pub fn min_connections(mut self, count: usize) -> Self {
        self.config.min_connections = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set how many connections may be established concurrently.
    #[must_use]
    pub fn max_connecting(mut self, count: usize) -> Self {
        self.config.max_connecting = count;
        self
    }

    /// Set the wait queue size.
    #[must_use]
    pub fn wait_queue_size(mut self, size: usize) -> Self {
        self.config.wait_queue_size = Some(size);
        self
    }

    /// Set how long a checkout may wait.
    #[must_use]
    pub fn wait_queue_timeout(mut self, timeout: Duration) -> Self {
        self.config.wait_queue_timeout = timeout;
        self
    }

    /// Set the maintenance interval.
    #[must_use]
    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.config.maintenance_interval = interval;
        self
    }

    /// Close dormant connections idle for longer than `idle`.
    #[must_use]
    pub fn max_idle_time(mut self, idle: Duration) -> Self {
        self.config.max_idle_time = Some(idle);
        self
    }

    /// Enable load-balanced mode.
    #[must_use]
    pub fn load_balanced(mut self, enabled: bool) -> Self {
        self.config.load_balanced = enabled;
        self
    }

    /// Set the server; defaults to cluster 0 on the default endpoint.
    #[must_use]
    pub fn server_id(mut self, server_id: ServerId) -> Self {
        self.server_id = Some(server_id);
        self
    }

    /// Set the server endpoint, keeping the cluster of any server already set.
    #[must_use]
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        let cluster_id = self.server_id.as_ref().map_or(0, ServerId::cluster_id);
        self.server_id = Some(ServerId::new(cluster_id, endpoint));
        self
    }

    /// Set the factory producing raw connections. Required.
    #[must_use]
    pub fn factory<F: ConnectionFactory + 'static>(mut self, factory: Arc<F>) -> Self {
        let factory: Arc<dyn ConnectionFactory> = factory;
        self.factory = Some(factory);
        self
    }

    /// Set the handshake and authentication run on new connections.
    #[must_use]
    pub fn initializer(mut self, initializer: ConnectionInitializer) -> Self {
        self.initializer = initializer;
        self
    }

    /// Receive pool events.
    #[must_use]
    pub fn event_subscriber(mut self, subscriber: impl EventSubscriber + 'static) -> Self {
        self.subscriber = Some(Arc::new(subscriber));
        self
    }

    /// Observe connection establishment failures.
    #[must_use]
    pub fn exception_handler(mut self, handler: impl ConnectionExceptionHandler + 'static) -> Self {
        self.exception_handler = Some(Arc::new(handler));
        self
    }

    /// Run maintenance and blocking checkouts on `runtime` instead of the
    /// current one.
    #[must_use]
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the pool.
    ///
    /// The pool starts uninitialized. Without an explicit runtime this must
    /// be called from within a Tokio runtime.
    pub fn build(self) -> Result<ConnectionPool, PoolError> {
        let Self {
            config,
            server_id,
            factory,
            initializer,
            subscriber,
            exception_handler,
            runtime,
        } = self;
        config.validate()?;

        let factory =
            factory.ok_or_else(|| PoolError::Config("a connection factory is required".into()))?;
        let runtime = match runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| {
                PoolError::Config("building a pool requires a Tokio runtime".into())
            })?,
        };
        let server_id = server_id.unwrap_or_else(|| ServerId::new(0, Endpoint::default()));
        let endpoint = server_id.endpoint().clone();
        let initializer = initializer.with_load_balanced(config.load_balanced);

        let events = Arc::new(EventLogger::new(server_id.clone(), subscriber));
        let service_states = Arc::new(ServiceStates::new());
        let max_connecting = Arc::new(SignalableSemaphore::new(config.max_connecting));
        let holder = ConnectionHolder::new(
            Arc::clone(&max_connecting),
            Arc::clone(&service_states),
            Arc::clone(&events),
            config.max_idle_time,
        );

        tracing::info!(
            server_id = %server_id,
            min = config.min_connections,
            max = config.max_connections,
            "connection pool created"
        );

        let inner = Arc::new(PoolInner {
            server_id,
            state: Mutex::new(PoolState::new(endpoint.to_string())),
            endpoint,
            factory,
            initializer,
            events,
            exception_handler,
            service_states,
            checkout_reasons: CheckOutReasonCounter::new(),
            max_connections: SignalableSemaphore::new(config.max_connections),
            max_connecting,
            wait_queue: WaitQueue::new(config.effective_wait_queue_size()),
            holder,
            maintenance: MaintenanceHelper::new(config.maintenance_interval),
            pending: AtomicUsize::new(0),
            runtime,
            created_at: Instant::now(),
            metrics: Mutex::new(PoolMetricsInner::default()),
            config,
        });
        Ok(ConnectionPool { inner })
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Number of dormant connections ready for reuse.
    pub available: usize,
    /// Number of connections currently checked out.
    pub in_use: usize,
    /// Total number of connections.
    pub total: usize,
    /// Maximum allowed connections.
    pub max: usize,
    /// Connections being established.
    pub pending: usize,
    /// Pool-wide generation.
    pub generation: u64,
}

impl PoolStatus {
    /// Calculate the utilization percentage.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        (self.in_use as f64 / self.max as f64) * 100.0
    }

    /// Check if the pool is at capacity.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.total >= self.max
    }
}

/// Metrics collected from the pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Total connections established since pool start.
    pub connections_created: u64,
    /// Total connections closed since pool start.
    pub connections_closed: u64,
    /// Successful connection checkouts.
    pub checkouts_successful: u64,
    /// Failed connection checkouts (timeouts, pool closed, etc.).
    pub checkouts_failed: u64,
    /// Time since pool creation.
    pub uptime: Duration,
}

impl PoolMetrics {
    /// Calculate checkout success rate (0.0 to 1.0).
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let total = self.checkouts_successful + self.checkouts_failed;
        if total == 0 {
            return 1.0;
        }
        self.checkouts_successful as f64 / total as f64
    }
}
