//! MONGODB-CR, the pre-3.0 challenge-response mechanism.

use std::fmt;

use async_trait::async_trait;
use bson::doc;
use mongo_protocol::{Connection, ConnectionDescription};
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use crate::authenticator::Authenticator;
use crate::credential::Password;
use crate::digest::{md5_hex, mongo_password_digest};
use crate::error::{AuthError, AuthErrorKind};

const NAME: &str = "MONGODB-CR";

/// `getnonce` followed by `authenticate` with an MD5 key.
pub struct MongoDbCrAuthenticator {
    username: String,
    password: Password,
    source: String,
}

impl MongoDbCrAuthenticator {
    /// Create the authenticator.
    pub fn new(username: impl Into<String>, password: Password, source: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password,
            source: source.into(),
        }
    }
}

/// `hex(md5(nonce + username + hex(md5("{username}:mongo:{password}"))))`.
pub(crate) fn authenticate_key(nonce: &str, username: &str, password: &Password) -> String {
    let digest = mongo_password_digest(username, password);
    let input = Zeroizing::new(format!("{nonce}{username}{}", digest.as_str()));
    md5_hex(input.as_bytes())
}

#[async_trait]
impl Authenticator for MongoDbCrAuthenticator {
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
        let fail = |kind: AuthErrorKind| AuthError::new(connection_id, NAME, kind);

        let reply = connection
            .run_command(&self.source, doc! { "getnonce": 1 }, cancel)
            .await
            .map_err(|e| fail(e.into()))?;
        let nonce = reply
            .get_str("nonce")
            .map_err(|_| fail(AuthErrorKind::unexpected("getnonce reply is missing a nonce")))?;

        let command = doc! {
            "authenticate": 1,
            "user": self.username.as_str(),
            "nonce": nonce,
            "key": authenticate_key(nonce, &self.username, &self.password),
        };
        connection
            .run_command(&self.source, command, cancel)
            .await
            .map_err(|e| fail(e.into()))?;
        Ok(())
    }
}

impl fmt::Debug for MongoDbCrAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoDbCrAuthenticator")
            .field("username", &self.username)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
