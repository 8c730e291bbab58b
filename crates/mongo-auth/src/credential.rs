//! Credentials and authentication mechanism selection.
//!
//! Passwords live in [`Password`], which zeroes its buffer on drop and only
//! exposes the plaintext inside a closure. Derived secrets (prepared
//! passwords, salted keys) use [`zeroize::Zeroizing`] buffers so every exit
//! path, including early returns through `?`, clears them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CredentialError;

/// Source database for mechanisms whose users live outside MongoDB.
pub const EXTERNAL_SOURCE: &str = "$external";

/// Default source database for password mechanisms.
pub const ADMIN_SOURCE: &str = "admin";

/// A secret password.
///
/// `Debug` never prints the value and the buffer is zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Password {
    secret: String,
}

impl Password {
    /// Wrap a plaintext password.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Run `f` with the plaintext.
    ///
    /// Callers must not copy the plaintext into buffers that outlive the closure
    /// unless those buffers zero themselves.
    pub fn expose<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        f(&self.secret)
    }

    /// Constant-time equality on the password bytes.
    #[must_use]
    pub fn ct_eq(&self, other: &Password) -> bool {
        self.secret.as_bytes().ct_eq(other.secret.as_bytes()).into()
    }

    /// Whether the password is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secret.is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

impl From<&str> for Password {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Password {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Supported authentication mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum AuthMechanism {
    /// SCRAM-SHA-1 (RFC 5802) with MongoDB's password digest.
    ScramSha1,
    /// SCRAM-SHA-256 (RFC 7677).
    ScramSha256,
    /// TLS client certificate.
    MongoDbX509,
    /// Legacy challenge-response.
    MongoDbCr,
    /// SASL PLAIN, typically backed by LDAP.
    Plain,
    /// Kerberos via GSSAPI.
    Gssapi,
    /// AWS IAM credentials.
    MongoDbAws,
}

impl AuthMechanism {
    /// Wire name of the mechanism.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScramSha1 => "SCRAM-SHA-1",
            Self::ScramSha256 => "SCRAM-SHA-256",
            Self::MongoDbX509 => "MONGODB-X509",
            Self::MongoDbCr => "MONGODB-CR",
            Self::Plain => "PLAIN",
            Self::Gssapi => "GSSAPI",
            Self::MongoDbAws => "MONGODB-AWS",
        }
    }

    /// Source database used when the credential names none.
    #[must_use]
    pub fn default_source(&self) -> &'static str {
        match self {
            Self::ScramSha1 | Self::ScramSha256 | Self::MongoDbCr => ADMIN_SOURCE,
            Self::MongoDbX509 | Self::Plain | Self::Gssapi | Self::MongoDbAws => EXTERNAL_SOURCE,
        }
    }
}

impl fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMechanism {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SCRAM-SHA-1" => Ok(Self::ScramSha1),
            "SCRAM-SHA-256" => Ok(Self::ScramSha256),
            "MONGODB-X509" => Ok(Self::MongoDbX509),
            "MONGODB-CR" => Ok(Self::MongoDbCr),
            "PLAIN" => Ok(Self::Plain),
            "GSSAPI" => Ok(Self::Gssapi),
            "MONGODB-AWS" => Ok(Self::MongoDbAws),
            _ => Err(CredentialError::UnknownMechanism(s.to_owned())),
        }
    }
}

/// Identity and secret used to authenticate new connections.
///
/// A credential without a mechanism negotiates SCRAM-SHA-256 or SCRAM-SHA-1
/// with the server.
#[derive(Debug, Clone, Default)]
pub struct Credential {
    mechanism: Option<AuthMechanism>,
    source: Option<String>,
    username: Option<String>,
    password: Option<Password>,
    mechanism_properties: BTreeMap<String, String>,
}

impl Credential {
    /// Create an empty credential.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Username and password with server-negotiated SCRAM.
    pub fn default_mechanism(username: impl Into<String>, password: impl Into<Password>) -> Self {
        Self::new().username(username).password(password)
    }

    /// Username and password with an explicit SCRAM variant.
    pub fn scram(
        mechanism: AuthMechanism,
        username: impl Into<String>,
        password: impl Into<Password>,
    ) -> Self {
        Self::default_mechanism(username, password).mechanism(mechanism)
    }

    /// Certificate authentication; the username may be taken from the certificate.
    #[must_use]
    pub fn x509(username: Option<String>) -> Self {
        Self {
            mechanism: Some(AuthMechanism::MongoDbX509),
            username,
            ..Self::default()
        }
    }

    /// SASL PLAIN.
    pub fn plain(username: impl Into<String>, password: impl Into<Password>) -> Self {
        Self::default_mechanism(username, password).mechanism(AuthMechanism::Plain)
    }

    /// Kerberos principal.
    pub fn gssapi(username: impl Into<String>) -> Self {
        Self::new().username(username).mechanism(AuthMechanism::Gssapi)
    }

    /// AWS IAM credentials; leave everything unset to read them from the environment.
    #[must_use]
    pub fn aws() -> Self {
        Self::new().mechanism(AuthMechanism::MongoDbAws)
    }

    /// Legacy MONGODB-CR.
    pub fn mongodb_cr(username: impl Into<String>, password: impl Into<Password>) -> Self {
        Self::default_mechanism(username, password).mechanism(AuthMechanism::MongoDbCr)
    }

    /// Set the mechanism.
    #[must_use]
    pub fn mechanism(mut self, mechanism: AuthMechanism) -> Self {
        self.mechanism = Some(mechanism);
        self
    }

    /// Set the source database.
    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set the username.
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password.
    #[must_use]
    pub fn password(mut self, password: impl Into<Password>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Add a mechanism property such as `SERVICE_NAME` or `AWS_SESSION_TOKEN`.
    #[must_use]
    pub fn mechanism_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.mechanism_properties.insert(name.into(), value.into());
        self
    }

    /// Configured mechanism, if any.
    #[must_use]
    pub fn get_mechanism(&self) -> Option<AuthMechanism> {
        self.mechanism
    }

    /// Configured username.
    #[must_use]
    pub fn get_username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Configured password.
    #[must_use]
    pub fn get_password(&self) -> Option<&Password> {
        self.password.as_ref()
    }

    /// Look up a mechanism property.
    #[must_use]
    pub fn get_mechanism_property(&self, name: &str) -> Option<&str> {
        self.mechanism_properties.get(name).map(String::as_str)
    }

    /// The source database, falling back to the mechanism's default.
    #[must_use]
    pub fn resolved_source(&self) -> &str {
        match (&self.source, self.mechanism) {
            (Some(source), _) => source,
            (None, Some(mechanism)) => mechanism.default_source(),
            (None, None) => ADMIN_SOURCE,
        }
    }

    /// Check the credential against its mechanism's rules.
    pub fn validate(&self) -> Result<(), CredentialError> {
        match self.mechanism {
            None => self.validate_password_mechanism("DEFAULT"),
            Some(AuthMechanism::ScramSha1 | AuthMechanism::ScramSha256 | AuthMechanism::MongoDbCr) => {
                self.validate_password_mechanism(self.mechanism_name())
            }
            Some(AuthMechanism::Plain) => {
                self.validate_password_mechanism("PLAIN")?;
                self.validate_no_properties("PLAIN")
            }
            Some(AuthMechanism::MongoDbX509) => {
                const NAME: &str = "MONGODB-X509";
                if self.password.is_some() {
                    return Err(CredentialError::Forbidden {
                        mechanism: NAME,
                        field: "password",
                    });
                }
                self.validate_external_source(NAME)?;
                self.validate_no_properties(NAME)
            }
            Some(AuthMechanism::Gssapi) => {
                const NAME: &str = "GSSAPI";
                if self.username.as_deref().is_none_or(str::is_empty) {
                    return Err(CredentialError::Missing {
                        mechanism: NAME,
                        field: "username",
                    });
                }
                self.validate_external_source(NAME)?;
                for name in self.mechanism_properties.keys() {
                    if !crate::mechanism::gssapi::PROPERTIES.contains(&name.as_str()) {
                        return Err(CredentialError::UnknownProperty {
                            mechanism: NAME,
                            name: name.clone(),
                        });
                    }
                }
                Ok(())
            }
            Some(AuthMechanism::MongoDbAws) => self.validate_aws(),
        }
    }

    fn mechanism_name(&self) -> &'static str {
        self.mechanism.map_or("DEFAULT", |m| m.as_str())
    }

    fn validate_password_mechanism(&self, mechanism: &'static str) -> Result<(), CredentialError> {
        if self.username.as_deref().is_none_or(str::is_empty) {
            return Err(CredentialError::Missing {
                mechanism,
                field: "username",
            });
        }
        if self.password.is_none() {
            return Err(CredentialError::Missing {
                mechanism,
                field: "password",
            });
        }
        Ok(())
    }

    fn validate_external_source(&self, mechanism: &'static str) -> Result<(), CredentialError> {
        let source = self.resolved_source();
        if source != EXTERNAL_SOURCE {
            return Err(CredentialError::InvalidSource {
                mechanism,
                expected: EXTERNAL_SOURCE,
                actual: source.to_owned(),
            });
        }
        Ok(())
    }

    fn validate_no_properties(&self, mechanism: &'static str) -> Result<(), CredentialError> {
        match self.mechanism_properties.keys().next() {
            Some(name) => Err(CredentialError::UnknownProperty {
                mechanism,
                name: name.clone(),
            }),
            None => Ok(()),
        }
    }

    fn validate_aws(&self) -> Result<(), CredentialError> {
        const NAME: &str = "MONGODB-AWS";
        self.validate_external_source(NAME)?;

        for name in self.mechanism_properties.keys() {
            if name != "AWS_SESSION_TOKEN" {
                return Err(CredentialError::UnknownProperty {
                    mechanism: NAME,
                    name: name.clone(),
                });
            }
        }

        let has_token = self.mechanism_properties.contains_key("AWS_SESSION_TOKEN");
        match (&self.username, &self.password) {
            (Some(_), None) => Err(CredentialError::Invalid(
                "When using MONGODB-AWS authentication if a username is provided via settings then a password must be provided also.".into(),
            )),
            (None, Some(_)) => Err(CredentialError::Invalid(
                "When using MONGODB-AWS authentication if a password is provided via settings then a username must be provided also.".into(),
            )),
            (None, None) if has_token => Err(CredentialError::Invalid(
                "When using MONGODB-AWS authentication if a session token is provided via settings then a username and password must be provided also.".into(),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_debug_is_redacted() {
        let password = Password::new("pencil");
        assert_eq!(format!("{password:?}"), "Password([REDACTED])");
        let credential = Credential::default_mechanism("user", "pencil");
        assert!(!format!("{credential:?}").contains("pencil"));
    }

    #[test]
    fn test_password_constant_time_eq() {
        assert!(Password::new("a").ct_eq(&Password::new("a")));
        assert!(!Password::new("a").ct_eq(&Password::new("b")));
        assert!(!Password::new("a").ct_eq(&Password::new("ab")));
    }

    #[test]
    fn test_mechanism_parsing() {
        assert_eq!("scram-sha-256".parse::<AuthMechanism>(), Ok(AuthMechanism::ScramSha256));
        assert_eq!("MONGODB-AWS".parse::<AuthMechanism>(), Ok(AuthMechanism::MongoDbAws));
        assert!("NTLM".parse::<AuthMechanism>().is_err());
    }

    #[test]
    fn test_resolved_source_defaults() {
        assert_eq!(Credential::default_mechanism("u", "p").resolved_source(), "admin");
        assert_eq!(Credential::plain("u", "p").resolved_source(), "$external");
        assert_eq!(Credential::default_mechanism("u", "p").source("app").resolved_source(), "app");
    }

    #[test]
    fn test_password_mechanisms_require_both_fields() {
        assert!(Credential::default_mechanism("u", "p").validate().is_ok());
        assert_eq!(
            Credential::new().username("u").validate(),
            Err(CredentialError::Missing {
                mechanism: "DEFAULT",
                field: "password"
            })
        );
        assert!(Credential::new().password("p").mechanism(AuthMechanism::ScramSha1).validate().is_err());
    }

    #[test]
    fn test_x509_rejects_password_and_internal_source() {
        assert!(Credential::x509(None).validate().is_ok());
        assert!(Credential::x509(None).password("p").validate().is_err());
        assert!(Credential::x509(None).source("admin").validate().is_err());
    }

    #[test]
    fn test_aws_rules() {
        assert!(Credential::aws().validate().is_ok());
        assert!(Credential::aws().username("AKID").password("secret").validate().is_ok());
        assert!(Credential::aws().username("AKID").validate().is_err());
        assert!(Credential::aws().password("secret").validate().is_err());
        assert!(
            Credential::aws()
                .mechanism_property("AWS_SESSION_TOKEN", "token")
                .validate()
                .is_err()
        );
        assert!(
            Credential::aws()
                .username("AKID")
                .password("secret")
                .mechanism_property("AWS_SESSION_TOKEN", "token")
                .validate()
                .is_ok()
        );
        assert_eq!(
            Credential::aws().mechanism_property("REGION", "x").validate(),
            Err(CredentialError::UnknownProperty {
                mechanism: "MONGODB-AWS",
                name: "REGION".into()
            })
        );
        assert!(Credential::aws().source("admin").validate().is_err());
    }

    #[test]
    fn test_gssapi_properties() {
        assert!(
            Credential::gssapi("user@EXAMPLE.COM")
                .mechanism_property("SERVICE_NAME", "mongo")
                .validate()
                .is_ok()
        );
        assert!(
            Credential::gssapi("user@EXAMPLE.COM")
                .mechanism_property("AWS_SESSION_TOKEN", "x")
                .validate()
                .is_err()
        );
    }
}
