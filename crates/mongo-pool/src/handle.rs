//! Checked-out connections.

use std::sync::Arc;

use async_trait::async_trait;
use mongo_protocol::bson::Document;
use mongo_protocol::{
    CancellationToken, Connection, ConnectionDescription, ConnectionError, ConnectionId,
    ServerId, ServiceId,
};
use tokio::sync::OwnedSemaphorePermit;

use crate::checkout_reason::CheckOutReason;
use crate::holder::{InUseEntry, PooledConnection};
use crate::pool::PoolInner;

/// A connection checked out of a [`ConnectionPool`](crate::ConnectionPool).
///
/// Dropping the handle checks the connection back in: it is returned to the
/// pool, or closed if it has become stale, expired or interrupted meanwhile.
/// The pool capacity slot is released after the check-in completes.
pub struct ConnectionHandle {
    connection: Option<PooledConnection>,
    entry: Arc<InUseEntry>,
    pool: Arc<PoolInner>,
    check_out_reason: Option<CheckOutReason>,
    _permit: OwnedSemaphorePermit,
}

impl ConnectionHandle {
    pub(crate) fn new(
        connection: PooledConnection,
        entry: Arc<InUseEntry>,
        pool: Arc<PoolInner>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            connection: Some(connection),
            entry,
            pool,
            check_out_reason: None,
            _permit: permit,
        }
    }

    #[allow(clippy::expect_used)]
    fn pooled(&self) -> &PooledConnection {
        self.connection
            .as_ref()
            .expect("connection is present until the handle drops")
    }

    #[allow(clippy::expect_used)]
    fn pooled_mut(&mut self) -> &mut PooledConnection {
        self.connection
            .as_mut()
            .expect("connection is present until the handle drops")
    }

    /// Generation recorded when the connection was created.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.pooled().generation()
    }

    /// Load-balancer service the connection is bound to.
    #[must_use]
    pub fn service_id(&self) -> Option<ServiceId> {
        self.pooled().service_id()
    }

    /// What the connection is pinned to, if anything.
    #[must_use]
    pub fn check_out_reason(&self) -> Option<CheckOutReason> {
        self.check_out_reason
    }

    /// Record why the connection stays checked out.
    ///
    /// Only the first reason counts; it is released when the handle drops.
    pub fn set_check_out_reason_if_not_already_set(&mut self, reason: CheckOutReason) {
        if self.check_out_reason.is_none() {
            self.check_out_reason = Some(reason);
            self.pool.checkout_reasons().increment(reason);
        }
    }

    /// Whether a clear has interrupted this connection.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.entry.is_interrupted()
    }
}

#[async_trait]
impl Connection for ConnectionHandle {
    fn id(&self) -> ConnectionId {
        self.pooled().id()
    }

    fn server_id(&self) -> &ServerId {
        self.pooled().connection().server_id()
    }

    fn description(&self) -> Option<&ConnectionDescription> {
        self.pooled().connection().description()
    }

    fn set_description(&mut self, description: ConnectionDescription) {
        self.pooled_mut().connection_mut().set_description(description);
    }

    fn is_expired(&self) -> bool {
        self.entry.is_interrupted()
            || self.pool.is_disposed()
            || self.pool.is_unusable(self.pooled())
    }

    async fn open(&mut self, cancel: &CancellationToken) -> Result<(), ConnectionError> {
        if self.entry.is_interrupted() {
            return Err(ConnectionError::Closed);
        }
        self.pooled_mut().connection_mut().open(cancel).await
    }

    async fn run_command(
        &mut self,
        database: &str,
        command: Document,
        cancel: &CancellationToken,
    ) -> Result<Document, ConnectionError> {
        if self.entry.is_interrupted() {
            return Err(ConnectionError::Closed);
        }
        self.pooled_mut()
            .connection_mut()
            .run_command(database, command, cancel)
            .await
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool
                .check_in(connection, &self.entry, self.check_out_reason.take());
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("ConnectionHandle");
        if let Some(connection) = &self.connection {
            debug
                .field("id", &connection.id())
                .field("generation", &connection.generation())
                .field("service_id", &connection.service_id());
        }
        debug
            .field("check_out_reason", &self.check_out_reason)
            .field("interrupted", &self.entry.is_interrupted())
            .finish()
    }
}
