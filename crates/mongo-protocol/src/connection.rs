//! The connection seam consumed by authentication and pooling.

use std::fmt;

use async_trait::async_trait;
use bson::Document;
use tokio_util::sync::CancellationToken;

use crate::description::ConnectionDescription;
use crate::error::ConnectionError;
use crate::ids::{ConnectionId, Endpoint, ServerId};

/// A single network connection to one server.
///
/// Connections are created unopened by a [`ConnectionFactory`]. Owners call
/// [`open`](Connection::open) once, then run the handshake and authentication
/// commands through [`run_command`](Connection::run_command). A connection is
/// never used by two tasks at once; dropping it closes the transport.
#[async_trait]
pub trait Connection: Send + Sync + fmt::Debug {
    /// Driver-side id (plus the server value once the handshake has run).
    fn id(&self) -> ConnectionId;

    /// Server this connection talks to.
    fn server_id(&self) -> &ServerId;

    /// Description stored after the handshake, if any.
    fn description(&self) -> Option<&ConnectionDescription>;

    /// Store the handshake description.
    fn set_description(&mut self, description: ConnectionDescription);

    /// Whether the connection considers itself unusable (closed, errored, too old).
    fn is_expired(&self) -> bool;

    /// Establish the transport.
    async fn open(&mut self, cancel: &CancellationToken) -> Result<(), ConnectionError>;

    /// Run a command against `database` and return the reply.
    ///
    /// Replies with `ok: 0` are reported as [`ConnectionError::Command`].
    async fn run_command(
        &mut self,
        database: &str,
        command: Document,
        cancel: &CancellationToken,
    ) -> Result<Document, ConnectionError>;
}

/// Produces raw, unopened, unauthenticated connections.
pub trait ConnectionFactory: Send + Sync {
    /// Create a connection to `endpoint`.
    fn create_connection(&self, server_id: &ServerId, endpoint: &Endpoint) -> Box<dyn Connection>;
}

impl<F> ConnectionFactory for F
where
    F: Fn(&ServerId, &Endpoint) -> Box<dyn Connection> + Send + Sync,
{
    fn create_connection(&self, server_id: &ServerId, endpoint: &Endpoint) -> Box<dyn Connection> {
        self(server_id, endpoint)
    }
}
