//! MONGODB-AWS: prove an IAM identity by signing an STS request for the server.
//!
//! The client sends a random nonce, the server answers with its own nonce
//! (which must extend the client's) and the STS host to sign for. The client
//! then sends a SigV4 `Authorization` header the server replays against STS.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bson::{Binary, Document, doc, spec::BinarySubtype};
use chrono::{DateTime, Utc};
use mongo_protocol::{Connection, ConnectionDescription, reply};
use tokio_util::sync::CancellationToken;

use crate::authenticator::Authenticator;
use crate::credential::{Credential, EXTERNAL_SOURCE, Password};
use crate::error::{AuthError, AuthErrorKind};
use crate::random::RandomSource;
use crate::sasl::{self, SaslMechanism, SaslStep};

use super::sigv4::{self, SigningInput};

const NAME: &str = "MONGODB-AWS";
const CLIENT_NONCE_LENGTH: usize = 32;
const SESSION_TOKEN_PROPERTY: &str = "AWS_SESSION_TOKEN";

/// An access key pair with an optional session token.
#[derive(Clone)]
pub struct AwsCredentials {
    access_key_id: String,
    secret_access_key: Password,
    session_token: Option<String>,
}

impl AwsCredentials {
    /// Create credentials.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<Password>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    /// Access key id.
    #[must_use]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Session token of temporary credentials.
    #[must_use]
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Credentials carried by a MONGODB-AWS [`Credential`], if it names any.
    pub fn from_credential(credential: &Credential) -> Option<Self> {
        let access_key_id = credential.get_username()?;
        let secret = credential.get_password()?.clone();
        Some(Self {
            access_key_id: access_key_id.to_owned(),
            secret_access_key: secret,
            session_token: credential
                .get_mechanism_property(SESSION_TOKEN_PROPERTY)
                .map(str::to_owned),
        })
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// A source of AWS credentials consulted when the credential names none.
#[async_trait]
pub trait AwsCredentialsProvider: Send + Sync {
    /// `Ok(None)` when this source has nothing to offer.
    async fn credentials(&self) -> Result<Option<AwsCredentials>, AuthErrorKind>;
}

/// Reads `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and `AWS_SESSION_TOKEN`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentCredentialsProvider;

impl EnvironmentCredentialsProvider {
    /// Validate one set of environment values.
    pub fn from_values(
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        session_token: Option<String>,
    ) -> Result<Option<AwsCredentials>, AuthErrorKind> {
        let error = |message: &str| Err(AuthErrorKind::Credentials(message.to_owned()));
        match (access_key_id, secret_access_key, session_token) {
            (None, None, None) => Ok(None),
            (None, Some(_), _) => error(
                "When using MONGODB-AWS authentication if a secret access key is provided via environment variables then an access key ID must be provided also.",
            ),
            (Some(_), None, _) => error(
                "When using MONGODB-AWS authentication if an access key ID is provided via environment variables then a secret access key must be provided also.",
            ),
            (None, None, Some(_)) => error(
                "When using MONGODB-AWS authentication if a session token is provided via environment variables then an access key ID and a secret access key must be provided also.",
            ),
            (Some(id), Some(secret), token) => Ok(Some(AwsCredentials::new(id, secret, token))),
        }
    }
}

#[async_trait]
impl AwsCredentialsProvider for EnvironmentCredentialsProvider {
    async fn credentials(&self) -> Result<Option<AwsCredentials>, AuthErrorKind> {
        let var = |name| std::env::var(name).ok();
        Self::from_values(
            var("AWS_ACCESS_KEY_ID"),
            var("AWS_SECRET_ACCESS_KEY"),
            var("AWS_SESSION_TOKEN"),
        )
    }
}

/// Fixed credentials, for applications that fetch them elsewhere.
#[async_trait]
impl AwsCredentialsProvider for AwsCredentials {
    async fn credentials(&self) -> Result<Option<AwsCredentials>, AuthErrorKind> {
        Ok(Some(self.clone()))
    }
}

/// Time source for request timestamps.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

enum AwsState {
    Initial,
    ClientFirstSent { nonce: Vec<u8> },
    ClientSecondSent,
    Complete,
}

/// SASL step logic for MONGODB-AWS.
pub struct AwsMechanism {
    credentials: AwsCredentials,
    random: Arc<dyn RandomSource>,
    clock: Arc<dyn Clock>,
    state: AwsState,
}

impl AwsMechanism {
    /// Create the mechanism with resolved credentials.
    pub fn new(
        credentials: AwsCredentials,
        random: Arc<dyn RandomSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credentials,
            random,
            clock,
            state: AwsState::Initial,
        }
    }

    fn client_second(&mut self, client_nonce: &[u8], payload: &[u8]) -> Result<SaslStep, AuthErrorKind> {
        let server_first = Document::from_reader(payload)
            .map_err(|e| AuthErrorKind::unexpected(format!("Invalid server-first-message: {e}")))?;
        let server_nonce = reply::get_binary(&server_first, "s")
            .ok_or_else(|| AuthErrorKind::unexpected("server-first-message is missing s"))?;
        let host = server_first
            .get_str("h")
            .map_err(|_| AuthErrorKind::unexpected("server-first-message is missing h"))?;

        if server_nonce.len() != CLIENT_NONCE_LENGTH * 2 || !server_nonce.starts_with(client_nonce) {
            return Err(AuthErrorKind::InvalidNonce);
        }
        if host.is_empty() || host.len() > 255 || host.contains("..") {
            return Err(AuthErrorKind::InvalidHost);
        }
        let unexpected: Vec<String> = server_first
            .keys()
            .filter(|name| *name != "h" && *name != "s")
            .cloned()
            .collect();
        if !unexpected.is_empty() {
            return Err(AuthErrorKind::UnexpectedFields(unexpected));
        }

        let signed = sigv4::sign(&SigningInput {
            now: self.clock.now(),
            access_key_id: &self.credentials.access_key_id,
            secret_access_key: &self.credentials.secret_access_key,
            session_token: self.credentials.session_token(),
            server_nonce,
            host,
        })?;

        let mut message = doc! { "a": signed.authorization, "d": signed.timestamp };
        if let Some(token) = self.credentials.session_token() {
            message.insert("t", token);
        }
        self.state = AwsState::ClientSecondSent;
        Ok(SaslStep::next(to_bytes(&message)?))
    }
}

fn to_bytes(document: &Document) -> Result<Vec<u8>, AuthErrorKind> {
    let mut bytes = Vec::new();
    document
        .to_writer(&mut bytes)
        .map_err(|e| AuthErrorKind::unexpected(format!("Unable to encode client message: {e}")))?;
    Ok(bytes)
}

impl SaslMechanism for AwsMechanism {
    fn name(&self) -> &'static str {
        NAME
    }

    fn database(&self) -> &str {
        EXTERNAL_SOURCE
    }

    fn initialize(&mut self) -> Result<SaslStep, AuthErrorKind> {
        let nonce = self.random.bytes(CLIENT_NONCE_LENGTH);
        let message = doc! {
            "r": Binary { subtype: BinarySubtype::Generic, bytes: nonce.clone() },
            "p": i32::from(b'n'),
        };
        self.state = AwsState::ClientFirstSent { nonce };
        Ok(SaslStep::next(to_bytes(&message)?))
    }

    fn transition(&mut self, server_payload: &[u8]) -> Result<SaslStep, AuthErrorKind> {
        match std::mem::replace(&mut self.state, AwsState::Complete) {
            AwsState::ClientFirstSent { nonce } => self.client_second(&nonce, server_payload),
            AwsState::ClientSecondSent => Ok(SaslStep::complete(Vec::new())),
            AwsState::Initial | AwsState::Complete => Err(AuthErrorKind::unexpected(
                "MONGODB-AWS received a message out of order",
            )),
        }
    }
}

impl fmt::Debug for AwsMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsMechanism")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

/// Resolves credentials for each connection, then runs the exchange.
pub struct AwsAuthenticator {
    credential: Arc<Credential>,
    providers: Vec<Arc<dyn AwsCredentialsProvider>>,
    random: Arc<dyn RandomSource>,
    clock: Arc<dyn Clock>,
}

impl AwsAuthenticator {
    /// Create the authenticator.
    pub fn new(
        credential: Arc<Credential>,
        providers: Vec<Arc<dyn AwsCredentialsProvider>>,
        random: Arc<dyn RandomSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credential,
            providers,
            random,
            clock,
        }
    }

    /// The credential's own keys first, then each provider in order.
    pub async fn resolve_credentials(&self) -> Result<AwsCredentials, AuthErrorKind> {
        if let Some(credentials) = AwsCredentials::from_credential(&self.credential) {
            return Ok(credentials);
        }
        for provider in &self.providers {
            if let Some(credentials) = provider.credentials().await? {
                return Ok(credentials);
            }
        }
        Err(AuthErrorKind::Credentials(
            "Unable to find credentials for MONGODB-AWS authentication.".into(),
        ))
    }
}

#[async_trait]
impl Authenticator for AwsAuthenticator {
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
        let credentials = self
            .resolve_credentials()
            .await
            .map_err(|kind| AuthError::new(connection_id, NAME, kind))?;
        tracing::debug!(
            connection_id = %connection_id,
            access_key_id = credentials.access_key_id(),
            "starting MONGODB-AWS conversation"
        );
        let mut mechanism =
            AwsMechanism::new(credentials, Arc::clone(&self.random), Arc::clone(&self.clock));
        sasl::converse(&mut mechanism, connection, None, cancel).await
    }
}

impl fmt::Debug for AwsAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsAuthenticator")
            .field("credential", &self.credential)
            .field("providers", &self.providers.len())
            .finish_non_exhaustive()
    }
}
