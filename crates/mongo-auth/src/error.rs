//! Authentication error types.

use mongo_protocol::{ConnectionError, ConnectionId};
use thiserror::Error;

/// An authentication attempt failed.
///
/// Always tagged with the connection it ran on and the mechanism that failed.
#[derive(Debug, Error)]
#[error("Unable to authenticate using mechanism {mechanism} on connection {connection_id}: {kind}")]
pub struct AuthError {
    connection_id: ConnectionId,
    mechanism: &'static str,
    #[source]
    kind: AuthErrorKind,
}

impl AuthError {
    /// Tag a failure with its connection and mechanism.
    pub fn new(connection_id: ConnectionId, mechanism: &'static str, kind: AuthErrorKind) -> Self {
        Self {
            connection_id,
            mechanism,
            kind,
        }
    }

    /// Connection the attempt ran on.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Mechanism name, e.g. `SCRAM-SHA-256`.
    #[must_use]
    pub fn mechanism(&self) -> &'static str {
        self.mechanism
    }

    /// What went wrong.
    #[must_use]
    pub fn kind(&self) -> &AuthErrorKind {
        &self.kind
    }

    /// Whether the failure came from the transport rather than from the exchange.
    #[must_use]
    pub fn is_network_error(&self) -> bool {
        matches!(&self.kind, AuthErrorKind::Connection(err) if err.is_network_error())
    }

    /// Whether the exchange stopped because the caller cancelled it.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(&self.kind, AuthErrorKind::Connection(ConnectionError::Cancelled))
    }
}

/// Failure classes of an authentication exchange.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthErrorKind {
    /// The server nonce did not extend the client nonce.
    #[error("Server sent an invalid nonce.")]
    InvalidNonce,

    /// The server proof did not match the expected signature.
    #[error("Server signature was invalid.")]
    InvalidServerSignature,

    /// The server asked for fewer key-derivation rounds than allowed.
    #[error("Server returned an invalid iteration count {count} (minimum {minimum}).")]
    InvalidIterationCount {
        /// Requested count.
        count: u32,
        /// Minimum accepted count.
        minimum: u32,
    },

    /// MONGODB-AWS: the STS host is malformed.
    #[error("Server returned an invalid sts host.")]
    InvalidHost,

    /// MONGODB-AWS: the server message carried fields the client does not know.
    #[error("Server returned unexpected fields: {}.", .0.join(", "))]
    UnexpectedFields(Vec<String>),

    /// The server reply did not match the expected shape.
    #[error("{0}")]
    UnexpectedResponse(String),

    /// The server reported an error inside the SASL payload.
    #[error("Server reported an error: {0}")]
    ServerError(String),

    /// The server supports none of the mechanisms the client can use.
    #[error("Unsupported mechanism: {0}")]
    UnsupportedMechanism(String),

    /// Credentials could not be prepared or resolved.
    #[error("Invalid credentials: {0}")]
    Credentials(String),

    /// The GSSAPI security context failed.
    #[error("GSSAPI failure: {0}")]
    Gssapi(String),

    /// A command of the exchange failed.
    #[error("{0}")]
    Connection(#[from] ConnectionError),
}

impl AuthErrorKind {
    /// Create an unexpected-response error.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedResponse(message.into())
    }
}

/// A credential is not usable with its mechanism.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CredentialError {
    /// A required field is missing.
    #[error("{mechanism} requires a {field}")]
    Missing {
        /// Mechanism being validated.
        mechanism: &'static str,
        /// Missing field name.
        field: &'static str,
    },

    /// A field is present that the mechanism forbids.
    #[error("{mechanism} does not support a {field}")]
    Forbidden {
        /// Mechanism being validated.
        mechanism: &'static str,
        /// Offending field name.
        field: &'static str,
    },

    /// The authentication source is not allowed.
    #[error("{mechanism} requires source \"{expected}\", got \"{actual}\"")]
    InvalidSource {
        /// Mechanism being validated.
        mechanism: &'static str,
        /// Required source.
        expected: &'static str,
        /// Configured source.
        actual: String,
    },

    /// A mechanism property is not recognized.
    #[error("{mechanism} does not support the mechanism property {name}")]
    UnknownProperty {
        /// Mechanism being validated.
        mechanism: &'static str,
        /// Property name.
        name: String,
    },

    /// The mechanism name is not recognized.
    #[error("unknown authentication mechanism {0}")]
    UnknownMechanism(String),

    /// A free-form rule was violated.
    #[error("{0}")]
    Invalid(String),
}

/// Failure while initializing a new connection.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The `hello` exchange or transport failed.
    #[error("connection handshake failed: {0}")]
    Connection(#[from] ConnectionError),

    /// Authentication failed after a successful `hello`.
    #[error(transparent)]
    Authentication(#[from] AuthError),
}

impl HandshakeError {
    /// Whether the failure came from the transport.
    #[must_use]
    pub fn is_network_error(&self) -> bool {
        match self {
            Self::Connection(err) => err.is_network_error(),
            Self::Authentication(err) => err.is_network_error(),
        }
    }
}
