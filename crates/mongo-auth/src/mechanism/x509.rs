//! MONGODB-X509: the TLS client certificate is the identity.

use async_trait::async_trait;
use bson::{Document, doc};
use mongo_protocol::{Connection, ConnectionDescription, ConnectionId};
use tokio_util::sync::CancellationToken;

use crate::authenticator::Authenticator;
use crate::credential::EXTERNAL_SOURCE;
use crate::error::AuthError;

const NAME: &str = "MONGODB-X509";

/// Sends a single `authenticate` command, speculatively when possible.
#[derive(Debug, Clone)]
pub struct X509Authenticator {
    username: Option<String>,
    speculative_started: bool,
}

impl X509Authenticator {
    /// `username` may be omitted; the server then takes it from the certificate subject.
    #[must_use]
    pub fn new(username: Option<String>) -> Self {
        Self {
            username,
            speculative_started: false,
        }
    }

    fn authenticate_command(&self) -> Document {
        let mut command = doc! { "authenticate": 1, "mechanism": NAME };
        if let Some(username) = &self.username {
            command.insert("user", username.as_str());
        }
        command
    }
}

#[async_trait]
impl Authenticator for X509Authenticator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn customize_initial_handshake(
        &mut self,
        hello: &mut Document,
        _connection_id: ConnectionId,
    ) -> Result<(), AuthError> {
        let mut command = self.authenticate_command();
        command.insert("db", EXTERNAL_SOURCE);
        hello.insert("speculativeAuthenticate", command);
        self.speculative_started = true;
        Ok(())
    }

    async fn authenticate(
        &mut self,
        connection: &mut dyn Connection,
        description: &ConnectionDescription,
        cancel: &CancellationToken,
    ) -> Result<(), AuthError> {
        if std::mem::take(&mut self.speculative_started)
            && description.hello().speculative_authenticate().is_some()
        {
            tracing::debug!(connection_id = %connection.id(), "X509 authenticated speculatively");
            return Ok(());
        }

        let connection_id = connection.id();
        connection
            .run_command(EXTERNAL_SOURCE, self.authenticate_command(), cancel)
            .await
            .map_err(|e| AuthError::new(connection_id, NAME, e.into()))?;
        Ok(())
    }
}
