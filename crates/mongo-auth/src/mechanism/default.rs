//! Negotiated SCRAM for credentials that name no mechanism.

use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use mongo_protocol::{Connection, ConnectionDescription, ConnectionId};
use tokio_util::sync::CancellationToken;

use crate::authenticator::{Authenticator, SaslAuthenticator, scram_authenticator};
use crate::credential::{ADMIN_SOURCE, Credential};
use crate::error::{AuthError, AuthErrorKind};
use crate::random::RandomSource;
use crate::scram::{ScramCache, ScramMechanism, ScramVersion};

const NAME: &str = "DEFAULT";

/// Picks SCRAM-SHA-256 when the server advertises it for the user, SCRAM-SHA-1 otherwise.
///
/// The handshake asks the server for the user's mechanisms and races a
/// SCRAM-SHA-256 first step alongside. A speculative answer settles the
/// choice without another round trip.
pub struct DefaultAuthenticator {
    credential: Arc<Credential>,
    cache: Arc<ScramCache>,
    random: Arc<dyn RandomSource>,
    speculative: Option<SaslAuthenticator<ScramMechanism>>,
}

impl DefaultAuthenticator {
    /// Create the authenticator.
    pub fn new(
        credential: Arc<Credential>,
        cache: Arc<ScramCache>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            credential,
            cache,
            random,
            speculative: None,
        }
    }

    fn user_namespace(&self) -> String {
        format!(
            "{}.{}",
            self.credential.resolved_source(),
            self.credential.get_username().unwrap_or_default()
        )
    }

    async fn fetch_mechanisms(
        &self,
        connection: &mut dyn Connection,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, AuthError> {
        let connection_id = connection.id();
        let command = doc! {
            "hello": 1,
            "helloOk": true,
            "saslSupportedMechs": self.user_namespace(),
        };
        let reply = connection
            .run_command(ADMIN_SOURCE, command, cancel)
            .await
            .map_err(|e| AuthError::new(connection_id, NAME, e.into()))?;
        Ok(supported_mechanisms(&reply))
    }
}

/// Read `saslSupportedMechs` from a hello reply, ignoring non-string entries.
fn supported_mechanisms(reply: &Document) -> Vec<String> {
    match reply.get("saslSupportedMechs") {
        Some(Bson::Array(values)) => values
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    }
}

/// SCRAM-SHA-256 if the server lists it, otherwise SCRAM-SHA-1.
pub fn select_scram_version(mechanisms: &[String]) -> ScramVersion {
    if mechanisms
        .iter()
        .any(|m| m == ScramVersion::Sha256.name())
    {
        ScramVersion::Sha256
    } else {
        ScramVersion::Sha1
    }
}

#[async_trait]
impl Authenticator for DefaultAuthenticator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn customize_initial_handshake(
        &mut self,
        hello: &mut Document,
        connection_id: ConnectionId,
    ) -> Result<(), AuthError> {
        hello.insert("saslSupportedMechs", self.user_namespace());

        let mut speculative =
            scram_authenticator(ScramVersion::Sha256, &self.credential, &self.cache, &self.random)
                .with_speculative();
        speculative.customize_initial_handshake(hello, connection_id)?;
        self.speculative = Some(speculative);
        Ok(())
    }

    async fn authenticate(
        &mut self,
        connection: &mut dyn Connection,
        description: &ConnectionDescription,
        cancel: &CancellationToken,
    ) -> Result<(), AuthError> {
        let speculative = self.speculative.take();
        if let Some(mut speculative) = speculative {
            if description.hello().speculative_authenticate().is_some() {
                tracing::debug!(connection_id = %connection.id(), "resuming speculative SCRAM-SHA-256");
                return speculative.authenticate(connection, description, cancel).await;
            }
        }

        let mechanisms = match description.hello().sasl_supported_mechs() {
            Some(mechanisms) => mechanisms.to_vec(),
            None => self.fetch_mechanisms(connection, cancel).await?,
        };
        let version = select_scram_version(&mechanisms);
        tracing::debug!(
            connection_id = %connection.id(),
            mechanism = version.name(),
            advertised = ?mechanisms,
            "selected SCRAM mechanism"
        );

        let mut authenticator =
            scram_authenticator(version, &self.credential, &self.cache, &self.random);
        authenticator
            .authenticate(connection, description, cancel)
            .await
    }
}

impl std::fmt::Debug for DefaultAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultAuthenticator")
            .field("credential", &self.credential)
            .field("speculative", &self.speculative.is_some())
            .finish_non_exhaustive()
    }
}
