//! The connection handshake: `hello`, then authentication.

use bson::{Document, doc};
use mongo_protocol::{Connection, ConnectionDescription, ConnectionError, HelloResult};
use tokio_util::sync::CancellationToken;

use crate::authenticator::AuthenticatorFactory;
use crate::credential::ADMIN_SOURCE;
use crate::error::HandshakeError;

const DRIVER_NAME: &str = "mongo-rust-pool";

/// Runs the handshake on every newly opened connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionInitializer {
    authenticator_factory: Option<AuthenticatorFactory>,
    load_balanced: bool,
    app_name: Option<String>,
}

impl ConnectionInitializer {
    /// Handshake without authentication.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Authenticate every connection with authenticators from `factory`.
    #[must_use]
    pub fn with_authenticator_factory(mut self, factory: AuthenticatorFactory) -> Self {
        self.authenticator_factory = Some(factory);
        self
    }

    /// Announce load-balanced mode and require a `serviceId` in the reply.
    #[must_use]
    pub fn with_load_balanced(mut self, load_balanced: bool) -> Self {
        self.load_balanced = load_balanced;
        self
    }

    /// Application name reported in the client metadata.
    #[must_use]
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    /// Whether connections are initialized in load-balanced mode.
    #[must_use]
    pub fn is_load_balanced(&self) -> bool {
        self.load_balanced
    }

    /// The initial `hello` before any authenticator customizes it.
    #[must_use]
    pub fn hello_command(&self) -> Document {
        let mut client = doc! {
            "driver": { "name": DRIVER_NAME, "version": env!("CARGO_PKG_VERSION") },
            "os": { "type": std::env::consts::OS, "architecture": std::env::consts::ARCH },
        };
        if let Some(app_name) = &self.app_name {
            client.insert("application", doc! { "name": app_name.as_str() });
        }

        let mut hello = doc! { "hello": 1, "helloOk": true };
        if self.load_balanced {
            hello.insert("loadBalanced", true);
        }
        hello.insert("client", client);
        hello
    }

    /// Send `hello` over an opened connection, record its description, and authenticate.
    pub async fn handshake(
        &self,
        connection: &mut dyn Connection,
        cancel: &CancellationToken,
    ) -> Result<ConnectionDescription, HandshakeError> {
        let mut authenticator = self.authenticator_factory.as_ref().map(AuthenticatorFactory::create);

        let mut hello = self.hello_command();
        if let Some(authenticator) = authenticator.as_mut() {
            authenticator.customize_initial_handshake(&mut hello, connection.id())?;
        }

        let reply = connection.run_command(ADMIN_SOURCE, hello, cancel).await?;
        let hello = HelloResult::parse(reply)?;
        if self.load_balanced && hello.service_id().is_none() {
            return Err(ConnectionError::protocol(
                "Driver attempted to initialize in load balancing mode, but the server does not support this mode.",
            )
            .into());
        }

        let description = ConnectionDescription::new(connection.id(), hello);
        connection.set_description(description.clone());
        tracing::debug!(
            connection_id = %description.connection_id(),
            max_wire_version = description.max_wire_version(),
            service_id = ?description.service_id(),
            "hello completed"
        );

        if let Some(authenticator) = authenticator.as_mut() {
            authenticator
                .authenticate(connection, &description, cancel)
                .await?;
            tracing::debug!(
                connection_id = %description.connection_id(),
                mechanism = authenticator.name(),
                "connection authenticated"
            );
        }

        Ok(description)
    }
}
