//! The authenticator seam and the factory that builds one per connection.

use std::sync::Arc;

use async_trait::async_trait;
use bson::Document;
use mongo_protocol::{Connection, ConnectionDescription, ConnectionId};
use tokio_util::sync::CancellationToken;

use crate::credential::{AuthMechanism, Credential, Password};
use crate::error::{AuthError, CredentialError};
use crate::mechanism::aws::{
    AwsAuthenticator, AwsCredentialsProvider, Clock, EnvironmentCredentialsProvider, SystemClock,
};
use crate::mechanism::default::DefaultAuthenticator;
use crate::mechanism::gssapi::{GssapiAuthenticator, GssapiContextFactory};
use crate::mechanism::mongodb_cr::MongoDbCrAuthenticator;
use crate::mechanism::plain::PlainMechanism;
use crate::mechanism::x509::X509Authenticator;
use crate::random::{OsRandom, RandomSource};
use crate::sasl::{self, SaslMechanism};
use crate::scram::{ScramCache, ScramMechanism, ScramVersion};

/// Authenticates one newly opened connection.
///
/// An instance is created per connection and used once: first to decorate
/// the handshake (speculative authentication), then to finish the exchange.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Mechanism name used in errors and logs.
    fn name(&self) -> &'static str;

    /// Add authentication fields to the initial `hello` command.
    fn customize_initial_handshake(
        &mut self,
        _hello: &mut Document,
        _connection_id: ConnectionId,
    ) -> Result<(), AuthError> {
        Ok(())
    }

    /// Run the exchange over an opened connection.
    ///
    /// `description` holds the handshake reply; when it carries a speculative
    /// result for this authenticator the exchange resumes from it.
    async fn authenticate(
        &mut self,
        connection: &mut dyn Connection,
        description: &ConnectionDescription,
        cancel: &CancellationToken,
    ) -> Result<(), AuthError>;
}

/// Adapts a [`SaslMechanism`] to [`Authenticator`].
#[derive(Debug)]
pub struct SaslAuthenticator<M> {
    mechanism: M,
    speculative: bool,
    speculative_started: bool,
}

impl<M: SaslMechanism> SaslAuthenticator<M> {
    /// Wrap a mechanism.
    pub fn new(mechanism: M) -> Self {
        Self {
            mechanism,
            speculative: false,
            speculative_started: false,
        }
    }

    /// Send the first step inside the handshake.
    #[must_use]
    pub fn with_speculative(mut self) -> Self {
        self.speculative = true;
        self
    }

    /// The wrapped mechanism.
    pub fn mechanism(&self) -> &M {
        &self.mechanism
    }
}

#[async_trait]
impl<M: SaslMechanism + 'static> Authenticator for SaslAuthenticator<M> {
    fn name(&self) -> &'static str {
        self.mechanism.name()
    }

    fn customize_initial_handshake(
        &mut self,
        hello: &mut Document,
        connection_id: ConnectionId,
    ) -> Result<(), AuthError> {
        if !self.speculative {
            return Ok(());
        }
        let step = self
            .mechanism
            .initialize()
            .map_err(|kind| AuthError::new(connection_id, self.mechanism.name(), kind))?;
        hello.insert(
            "speculativeAuthenticate",
            sasl::speculative_sasl_start(&self.mechanism, &step),
        );
        self.speculative_started = true;
        Ok(())
    }

    async fn authenticate(
        &mut self,
        connection: &mut dyn Connection,
        description: &ConnectionDescription,
        cancel: &CancellationToken,
    ) -> Result<(), AuthError> {
        let resume = if std::mem::take(&mut self.speculative_started) {
            description.hello().speculative_authenticate()
        } else {
            None
        };
        sasl::converse(&mut self.mechanism, connection, resume, cancel).await
    }
}

/// Builds a fresh [`Authenticator`] for each new connection.
///
/// Holds what connections share: the validated credential, the SCRAM key
/// cache, and pluggable collaborators for GSSAPI and AWS.
#[derive(Clone)]
pub struct AuthenticatorFactory {
    credential: Arc<Credential>,
    scram_cache: Arc<ScramCache>,
    random: Arc<dyn RandomSource>,
    gssapi: Option<Arc<dyn GssapiContextFactory>>,
    aws_providers: Vec<Arc<dyn AwsCredentialsProvider>>,
    clock: Arc<dyn Clock>,
}

impl AuthenticatorFactory {
    /// Validate `credential` and build a factory for it.
    pub fn new(credential: Credential) -> Result<Self, CredentialError> {
        credential.validate()?;

        Ok(Self {
            credential: Arc::new(credential),
            scram_cache: Arc::new(ScramCache::new()),
            random: Arc::new(OsRandom),
            gssapi: None,
            aws_providers: vec![Arc::new(EnvironmentCredentialsProvider)],
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the nonce source.
    #[must_use]
    pub fn with_random_source(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Provide the GSSAPI implementation.
    #[must_use]
    pub fn with_gssapi_context_factory(mut self, factory: Arc<dyn GssapiContextFactory>) -> Self {
        self.gssapi = Some(factory);
        self
    }

    /// Append an AWS credential source, consulted after the credential and the environment.
    #[must_use]
    pub fn with_aws_credentials_provider(mut self, provider: Arc<dyn AwsCredentialsProvider>) -> Self {
        self.aws_providers.push(provider);
        self
    }

    /// Replace the AWS credential sources entirely.
    #[must_use]
    pub fn with_aws_credentials_providers(
        mut self,
        providers: Vec<Arc<dyn AwsCredentialsProvider>>,
    ) -> Self {
        self.aws_providers = providers;
        self
    }

    /// Replace the clock used to timestamp AWS requests.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The credential in use.
    #[must_use]
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Shared SCRAM key cache.
    #[must_use]
    pub fn scram_cache(&self) -> &Arc<ScramCache> {
        &self.scram_cache
    }

    /// Build the authenticator for one connection.
    pub fn create(&self) -> Box<dyn Authenticator> {
        match self.credential.get_mechanism() {
            None => Box::new(DefaultAuthenticator::new(
                Arc::clone(&self.credential),
                Arc::clone(&self.scram_cache),
                Arc::clone(&self.random),
            )),
            Some(AuthMechanism::ScramSha1) => Box::new(self.scram(ScramVersion::Sha1)),
            Some(AuthMechanism::ScramSha256) => Box::new(self.scram(ScramVersion::Sha256)),
            Some(AuthMechanism::MongoDbX509) => Box::new(X509Authenticator::new(
                self.credential.get_username().map(str::to_owned),
            )),
            Some(AuthMechanism::MongoDbCr) => Box::new(MongoDbCrAuthenticator::new(
                self.username(),
                self.password(),
                self.credential.resolved_source(),
            )),
            Some(AuthMechanism::Plain) => Box::new(SaslAuthenticator::new(PlainMechanism::new(
                self.username(),
                self.password(),
                self.credential.resolved_source(),
            ))),
            Some(AuthMechanism::Gssapi) => Box::new(GssapiAuthenticator::new(
                Arc::clone(&self.credential),
                self.gssapi.clone(),
            )),
            Some(AuthMechanism::MongoDbAws) => Box::new(AwsAuthenticator::new(
                Arc::clone(&self.credential),
                self.aws_providers.clone(),
                Arc::clone(&self.random),
                Arc::clone(&self.clock),
            )),
        }
    }

    fn scram(&self, version: ScramVersion) -> SaslAuthenticator<ScramMechanism> {
        scram_authenticator(
            version,
            &self.credential,
            &self.scram_cache,
            &self.random,
        )
        .with_speculative()
    }

    fn username(&self) -> String {
        self.credential.get_username().unwrap_or_default().to_owned()
    }

    fn password(&self) -> Password {
        self.credential
            .get_password()
            .cloned()
            .unwrap_or_else(|| Password::new(""))
    }
}

impl std::fmt::Debug for AuthenticatorFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatorFactory")
            .field("credential", &self.credential)
            .field("gssapi", &self.gssapi.is_some())
            .finish_non_exhaustive()
    }
}

/// Build a SCRAM authenticator for `credential`.
pub(crate) fn scram_authenticator(
    version: ScramVersion,
    credential: &Credential,
    cache: &Arc<ScramCache>,
    random: &Arc<dyn RandomSource>,
) -> SaslAuthenticator<ScramMechanism> {
    SaslAuthenticator::new(ScramMechanism::new(
        version,
        credential.get_username().unwrap_or_default(),
        credential
            .get_password()
            .cloned()
            .unwrap_or_else(|| Password::new("")),
        credential.resolved_source(),
        Arc::clone(cache),
        Arc::clone(random),
    ))
}
