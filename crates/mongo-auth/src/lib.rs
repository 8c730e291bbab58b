//! # mongo-auth
//!
//! Authentication for newly established MongoDB connections.
//!
//! Every mechanism the server speaks is available behind one
//! [`Authenticator`] trait. An [`AuthenticatorFactory`] validates a
//! [`Credential`] once and then hands out a fresh authenticator per
//! connection; [`ConnectionInitializer`] ties it into the `hello` handshake
//! so mechanisms that support it can authenticate speculatively.
//!
//! ## Mechanisms
//!
//! | Mechanism | Notes |
//! |-----------|-------|
//! | negotiated (no mechanism) | SCRAM-SHA-256 when the server lists it, SCRAM-SHA-1 otherwise |
//! | `SCRAM-SHA-1`, `SCRAM-SHA-256` | Salted keys cached across connections |
//! | `MONGODB-X509` | Speculative, certificate identity |
//! | `PLAIN` | LDAP-backed users |
//! | `GSSAPI` | Kerberos through a caller-supplied security context |
//! | `MONGODB-AWS` | SigV4-signed STS request |
//! | `MONGODB-CR` | Legacy servers only |
//!
//! ## Security
//!
//! - Passwords are zeroized on drop and redacted from `Debug` output
//! - Derived keys are held in zeroizing buffers
//! - Server signatures and cached passwords are compared in constant time
//!
//! ## Example
//!
//! ```rust,ignore
//! use mongo_auth::{AuthenticatorFactory, ConnectionInitializer, Credential};
//!
//! let factory = AuthenticatorFactory::new(Credential::default_mechanism("app", "secret"))?;
//! let initializer = ConnectionInitializer::new().with_authenticator_factory(factory);
//! let description = initializer.handshake(&mut *connection, &cancel).await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod authenticator;
pub mod credential;
mod digest;
pub mod error;
pub mod initializer;
pub mod mechanism;
pub mod random;
pub mod sasl;
pub mod saslprep;
pub mod scram;

pub use authenticator::{Authenticator, AuthenticatorFactory, SaslAuthenticator};
pub use credential::{AuthMechanism, Credential, Password};
pub use error::{AuthError, AuthErrorKind, CredentialError, HandshakeError};
pub use initializer::ConnectionInitializer;
pub use mechanism::aws::{AwsCredentials, AwsCredentialsProvider, Clock, FixedClock, SystemClock};
pub use mechanism::gssapi::{GssapiContextFactory, GssapiSecurityContext, GssapiTarget};
pub use random::{FixedRandom, OsRandom, RandomSource};
pub use sasl::{SaslMechanism, SaslStep};
pub use scram::{ScramCache, ScramVersion};
