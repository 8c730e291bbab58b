//! Pool lifecycle events.
//!
//! Every event is logged through `tracing` and, when a subscriber is
//! configured, forwarded to it synchronously and in order. Subscribers must
//! not call back into the pool.

use std::sync::Arc;
use std::time::Duration;

use mongo_protocol::{ConnectionId, ServerId, ServiceId};

use crate::error::CheckOutFailedReason;

/// Why a connection was closed by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalReason {
    /// Its generation is older than the pool's or its service's.
    Stale,
    /// It sat dormant for longer than the maximum idle time.
    Idle,
    /// The connection reported itself expired.
    Expired,
    /// It was interrupted by a clear that closed in-use connections.
    Interrupted,
    /// The pool was disposed.
    PoolClosed,
}

impl RemovalReason {
    /// Short lowercase name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stale => "stale",
            Self::Idle => "idle",
            Self::Expired => "expired",
            Self::Interrupted => "interrupted",
            Self::PoolClosed => "pool closed",
        }
    }
}

/// Something that happened in a pool.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum PoolEvent {
    /// `initialize` started.
    PoolOpening,
    /// `initialize` finished.
    PoolOpened,
    /// The pool became ready.
    PoolReady,
    /// The pool was cleared.
    PoolCleared {
        /// Service scope, `None` for the whole pool.
        service_id: Option<ServiceId>,
        /// Whether in-use connections are interrupted.
        close_in_use: bool,
    },
    /// `dispose` started.
    PoolClosing,
    /// `dispose` finished.
    PoolClosed,
    /// A checkout started.
    CheckingOut,
    /// A checkout succeeded.
    CheckedOut {
        /// The connection handed out.
        connection_id: ConnectionId,
        /// Time spent in the checkout.
        duration: Duration,
    },
    /// A checkout failed.
    CheckingOutFailed {
        /// Failure class.
        reason: CheckOutFailedReason,
        /// Time spent in the checkout.
        duration: Duration,
    },
    /// A handle is returning its connection.
    CheckingIn {
        /// The connection being returned.
        connection_id: ConnectionId,
    },
    /// The check-in finished, whether the connection was kept or closed.
    CheckedIn {
        /// The returned connection.
        connection_id: ConnectionId,
        /// Time spent in the check-in.
        duration: Duration,
    },
    /// A new connection is being established.
    AddingConnection,
    /// A new connection is open and authenticated.
    ConnectionAdded {
        /// The new connection.
        connection_id: ConnectionId,
        /// Time spent opening and authenticating.
        duration: Duration,
    },
    /// A connection is about to be closed.
    RemovingConnection {
        /// The connection.
        connection_id: ConnectionId,
        /// Why it is closed.
        reason: RemovalReason,
    },
    /// A connection was closed.
    ConnectionRemoved {
        /// The connection.
        connection_id: ConnectionId,
        /// Why it was closed.
        reason: RemovalReason,
        /// Time spent closing it.
        duration: Duration,
    },
}

impl PoolEvent {
    /// The connection the event is about, if any.
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        match self {
            Self::CheckedOut { connection_id, .. }
            | Self::CheckingIn { connection_id }
            | Self::CheckedIn { connection_id, .. }
            | Self::ConnectionAdded { connection_id, .. }
            | Self::RemovingConnection { connection_id, .. }
            | Self::ConnectionRemoved { connection_id, .. } => Some(*connection_id),
            _ => None,
        }
    }
}

/// Receives pool events.
pub trait EventSubscriber: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &PoolEvent);
}

impl<F> EventSubscriber for F
where
    F: Fn(&PoolEvent) + Send + Sync,
{
    fn on_event(&self, event: &PoolEvent) {
        self(event);
    }
}

/// Logs events and forwards them to the subscriber.
pub(crate) struct EventLogger {
    server_id: ServerId,
    subscriber: Option<Arc<dyn EventSubscriber>>,
}

impl EventLogger {
    pub(crate) fn new(server_id: ServerId, subscriber: Option<Arc<dyn EventSubscriber>>) -> Self {
        Self {
            server_id,
            subscriber,
        }
    }

    pub(crate) fn publish(&self, event: PoolEvent) {
        let server = &self.server_id;
        match &event {
            PoolEvent::PoolOpening | PoolEvent::PoolClosing => {
                tracing::trace!(server_id = %server, event = ?event, "connection pool event");
            }
            PoolEvent::PoolOpened => tracing::info!(server_id = %server, "connection pool opened"),
            PoolEvent::PoolReady => tracing::info!(server_id = %server, "connection pool ready"),
            PoolEvent::PoolCleared {
                service_id,
                close_in_use,
            } => tracing::info!(
                server_id = %server,
                service_id = ?service_id,
                close_in_use,
                "connection pool cleared"
            ),
            PoolEvent::PoolClosed => tracing::info!(server_id = %server, "connection pool closed"),
            PoolEvent::CheckingOut => tracing::trace!(server_id = %server, "checking out connection"),
            PoolEvent::CheckedOut {
                connection_id,
                duration,
            } => tracing::debug!(
                connection_id = %connection_id,
                duration_ms = duration.as_millis() as u64,
                "connection checked out"
            ),
            PoolEvent::CheckingOutFailed { reason, duration } => tracing::warn!(
                server_id = %server,
                reason = ?reason,
                duration_ms = duration.as_millis() as u64,
                "connection checkout failed"
            ),
            PoolEvent::CheckingIn { connection_id } => {
                tracing::trace!(connection_id = %connection_id, "checking in connection");
            }
            PoolEvent::CheckedIn { connection_id, .. } => {
                tracing::trace!(connection_id = %connection_id, "connection checked in");
            }
            PoolEvent::AddingConnection => tracing::trace!(server_id = %server, "adding connection"),
            PoolEvent::ConnectionAdded {
                connection_id,
                duration,
            } => tracing::debug!(
                connection_id = %connection_id,
                duration_ms = duration.as_millis() as u64,
                "connection added"
            ),
            PoolEvent::RemovingConnection { connection_id, reason } => tracing::trace!(
                connection_id = %connection_id,
                reason = reason.as_str(),
                "removing connection"
            ),
            PoolEvent::ConnectionRemoved {
                connection_id,
                reason,
                ..
            } => tracing::debug!(
                connection_id = %connection_id,
                reason = reason.as_str(),
                "connection removed"
            ),
        }

        if let Some(subscriber) = &self.subscriber {
            subscriber.on_event(&event);
        }
    }
}

impl std::fmt::Debug for EventLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLogger")
            .field("server_id", &self.server_id)
            .field("subscriber", &self.subscriber.is_some())
            .finish()
    }
}
