//! Hooks into connection establishment.

use crate::error::PoolError;

/// Notified when the pool fails to open or authenticate a new connection.
///
/// The handler observes the failure; it cannot recover from it. Background
/// top-up failures are reported here and nowhere else besides the log, so a
/// server monitor typically implements this to mark the server unknown.
pub trait ConnectionExceptionHandler: Send + Sync {
    /// Called once per failed establishment, after the half-open
    /// connection has been closed.
    fn handle_exception_on_open(&self, error: &PoolError);
}

impl<F> ConnectionExceptionHandler for F
where
    F: Fn(&PoolError) + Send + Sync,
{
    fn handle_exception_on_open(&self, error: &PoolError) {
        self(error);
    }
}
