//! GSSAPI (Kerberos) over a caller-supplied security context.
//!
//! The crate does not link a Kerberos library. Applications plug one in by
//! implementing [`GssapiContextFactory`]; this module drives the SASL
//! exchange and the security-layer negotiation around it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use mongo_protocol::{Connection, ConnectionDescription};
use tokio_util::sync::CancellationToken;

use crate::authenticator::Authenticator;
use crate::credential::{Credential, EXTERNAL_SOURCE, Password};
use crate::error::{AuthError, AuthErrorKind};
use crate::sasl::{self, SaslMechanism, SaslStep};

const NAME: &str = "GSSAPI";

/// Mechanism properties GSSAPI accepts.
pub const PROPERTIES: [&str; 4] = [
    "SERVICE_NAME",
    "CANONICALIZE_HOST_NAME",
    "SERVICE_REALM",
    "SERVICE_HOST",
];

/// Default Kerberos service name of a MongoDB server.
pub const DEFAULT_SERVICE_NAME: &str = "mongodb";

/// The service the client authenticates to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GssapiTarget {
    /// Kerberos service name, `mongodb` unless overridden.
    pub service_name: String,
    /// Server host name.
    pub host: String,
    /// Realm of the service principal, if different from the client's.
    pub realm: Option<String>,
    /// Whether the context should canonicalize `host` through DNS first.
    pub canonicalize_host_name: bool,
}

impl GssapiTarget {
    /// Resolve the target from mechanism properties and the connection's host.
    pub fn from_credential(credential: &Credential, host: &str) -> Self {
        let property = |name: &str| credential.get_mechanism_property(name).map(str::to_owned);
        Self {
            service_name: property("SERVICE_NAME").unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_owned()),
            host: property("SERVICE_HOST").unwrap_or_else(|| host.to_owned()),
            realm: property("SERVICE_REALM"),
            canonicalize_host_name: credential
                .get_mechanism_property("CANONICALIZE_HOST_NAME")
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
        }
    }

    /// `service/host` or `service/host@REALM`.
    #[must_use]
    pub fn service_principal(&self) -> String {
        match &self.realm {
            Some(realm) => format!("{}/{}@{}", self.service_name, self.host, realm),
            None => format!("{}/{}", self.service_name, self.host),
        }
    }
}

/// An initiator-side GSSAPI security context.
pub trait GssapiSecurityContext: Send + Sync {
    /// Feed the server token (none on the first call) and return the next client token.
    fn step(&mut self, input: Option<&[u8]>) -> Result<Vec<u8>, String>;

    /// Whether context establishment has finished.
    fn is_established(&self) -> bool;

    /// Unwrap a message protected by the context.
    fn unwrap_message(&mut self, input: &[u8]) -> Result<Vec<u8>, String>;

    /// Protect a message with the context.
    fn wrap_message(&mut self, input: &[u8]) -> Result<Vec<u8>, String>;
}

/// Creates security contexts, one per connection.
pub trait GssapiContextFactory: Send + Sync {
    /// Acquire credentials for `username` and initialize a context towards `target`.
    fn create_context(
        &self,
        username: &str,
        password: Option<&Password>,
        target: &GssapiTarget,
    ) -> Result<Box<dyn GssapiSecurityContext>, String>;
}

enum GssapiState {
    Negotiating,
    AwaitingSecurityLayer,
    Complete,
}

/// SASL step logic around a security context.
pub struct GssapiMechanism {
    username: String,
    context: Box<dyn GssapiSecurityContext>,
    state: GssapiState,
}

impl GssapiMechanism {
    /// Wrap an initialized context.
    pub fn new(username: impl Into<String>, context: Box<dyn GssapiSecurityContext>) -> Self {
        Self {
            username: username.into(),
            context,
            state: GssapiState::Negotiating,
        }
    }

    fn advance(&mut self, input: Option<&[u8]>) -> Result<SaslStep, AuthErrorKind> {
        let output = self.context.step(input).map_err(AuthErrorKind::Gssapi)?;
        if self.context.is_established() {
            self.state = GssapiState::AwaitingSecurityLayer;
        }
        Ok(SaslStep::next(output))
    }

    /// Answer the server's security-layer offer: no layer, any buffer size, plus the user.
    fn security_layer(&mut self, offer: &[u8]) -> Result<SaslStep, AuthErrorKind> {
        let offer = self
            .context
            .unwrap_message(offer)
            .map_err(AuthErrorKind::Gssapi)?;
        if offer.len() < 4 {
            return Err(AuthErrorKind::unexpected(
                "GSSAPI security layer offer is shorter than 4 bytes",
            ));
        }

        let mut reply = vec![1, 0, 0, 0];
        reply.extend_from_slice(self.username.as_bytes());
        let wrapped = self
            .context
            .wrap_message(&reply)
            .map_err(AuthErrorKind::Gssapi)?;
        self.state = GssapiState::Complete;
        Ok(SaslStep::complete(wrapped))
    }
}

impl SaslMechanism for GssapiMechanism {
    fn name(&self) -> &'static str {
        NAME
    }

    fn database(&self) -> &str {
        EXTERNAL_SOURCE
    }

    fn initialize(&mut self) -> Result<SaslStep, AuthErrorKind> {
        self.state = GssapiState::Negotiating;
        self.advance(None)
    }

    fn transition(&mut self, server_payload: &[u8]) -> Result<SaslStep, AuthErrorKind> {
        match self.state {
            GssapiState::Negotiating => self.advance(Some(server_payload)),
            GssapiState::AwaitingSecurityLayer => self.security_layer(server_payload),
            GssapiState::Complete if server_payload.is_empty() => Ok(SaslStep::complete(Vec::new())),
            GssapiState::Complete => Err(AuthErrorKind::unexpected(
                "GSSAPI received a payload after completion",
            )),
        }
    }
}

impl fmt::Debug for GssapiMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GssapiMechanism")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Authenticator that builds a context for the connection's host and runs the exchange.
pub struct GssapiAuthenticator {
    credential: Arc<Credential>,
    factory: Option<Arc<dyn GssapiContextFactory>>,
}

impl GssapiAuthenticator {
    /// Create the authenticator; without a factory every attempt fails.
    pub fn new(credential: Arc<Credential>, factory: Option<Arc<dyn GssapiContextFactory>>) -> Self {
        Self {
            credential,
            factory,
        }
    }
}

#[async_trait]
impl Authenticator for GssapiAuthenticator {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn authenticate(
        &mut self,
        connection: &mut dyn Connection,
        _description: &ConnectionDescription,
        cancel: &CancellationToken,
    ) -> Result<(), AuthError> {
        let connection_id = connection.id();
        let fail = |kind| AuthError::new(connection_id, NAME, kind);

        let factory = self.factory.as_ref().ok_or_else(|| {
            fail(AuthErrorKind::Gssapi(
                "no GSSAPI context factory is configured".into(),
            ))
        })?;
        let username = self.credential.get_username().unwrap_or_default();
        let target = GssapiTarget::from_credential(&self.credential, connection.server_id().endpoint().host());
        tracing::debug!(
            connection_id = %connection_id,
            principal = %target.service_principal(),
            "starting GSSAPI conversation"
        );

        let context = factory
            .create_context(username, self.credential.get_password(), &target)
            .map_err(|e| fail(AuthErrorKind::Gssapi(e)))?;
        let mut mechanism = GssapiMechanism::new(username, context);
        sasl::converse(&mut mechanism, connection, None, cancel).await
    }
}

impl fmt::Debug for GssapiAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GssapiAuthenticator")
            .field("credential", &self.credential)
            .field("factory", &self.factory.is_some())
            .finish()
    }
}
