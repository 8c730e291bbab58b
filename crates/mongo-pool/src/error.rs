//! Pool error types.

use mongo_auth::{AuthError, HandshakeError};
use mongo_protocol::ConnectionError;
use thiserror::Error;

/// Why a checkout failed, as reported in `CheckingOutFailed` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckOutFailedReason {
    /// The pool was disposed.
    PoolClosed,
    /// No connection became available in time.
    Timeout,
    /// Anything else: the pool was paused, the queue was full, or a
    /// connection could not be established.
    ConnectionError,
}

/// Errors that can occur when using the connection pool.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// The pool was used before `initialize`.
    #[error("{0}")]
    NotInitialized(String),

    /// The pool is in a state that does not allow the operation.
    #[error("{0}")]
    InvalidOperation(String),

    /// The pool has been disposed.
    #[error("connection pool for {pool} has been disposed")]
    Disposed {
        /// Pool name (its endpoint).
        pool: String,
    },

    /// The pool is paused, typically after a clear.
    #[error("The connection pool is in paused state for server {endpoint}.")]
    Paused {
        /// Server endpoint.
        endpoint: String,
    },

    /// Too many callers are already waiting for a connection.
    #[error("The wait queue for acquiring a connection to server {pool} is full.")]
    WaitQueueFull {
        /// Server endpoint.
        pool: String,
    },

    /// No connection became available within the wait queue timeout.
    #[error("{message}")]
    Timeout {
        /// Description including elapsed time and checkout counts.
        message: String,
    },

    /// Opening the transport or the handshake failed.
    #[error("connection error: {0}")]
    Connection(ConnectionError),

    /// Authentication of a new connection failed.
    #[error(transparent)]
    Authentication(AuthError),

    /// The caller cancelled the checkout.
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid pool configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PoolError {
    /// The reason reported when this error ends a checkout.
    #[must_use]
    pub fn checkout_failed_reason(&self) -> CheckOutFailedReason {
        match self {
            Self::Disposed { .. } => CheckOutFailedReason::PoolClosed,
            Self::Timeout { .. } => CheckOutFailedReason::Timeout,
            _ => CheckOutFailedReason::ConnectionError,
        }
    }

    /// Whether retrying the operation on the same server may succeed.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Paused { .. } | Self::WaitQueueFull { .. } | Self::Timeout { .. } => true,
            Self::Connection(err) => err.is_network_error(),
            Self::Authentication(err) => err.is_network_error(),
            _ => false,
        }
    }

    /// Whether the pool has been disposed.
    #[must_use]
    pub fn is_pool_closed(&self) -> bool {
        matches!(self, Self::Disposed { .. })
    }
}

impl From<ConnectionError> for PoolError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Cancelled => Self::Cancelled,
            other => Self::Connection(other),
        }
    }
}

impl From<AuthError> for PoolError {
    fn from(err: AuthError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Authentication(err)
        }
    }
}

impl From<HandshakeError> for PoolError {
    fn from(err: HandshakeError) -> Self {
        match err {
            HandshakeError::Connection(err) => err.into(),
            HandshakeError::Authentication(err) => err.into(),
        }
    }
}
