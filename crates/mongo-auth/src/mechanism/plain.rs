//! SASL PLAIN (RFC 4616), typically backed by LDAP on the server.

use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::credential::Password;
use crate::error::AuthErrorKind;
use crate::sasl::{SaslMechanism, SaslStep};

/// PLAIN sends `\0username\0password` in a single step.
pub struct PlainMechanism {
    username: String,
    password: Password,
    source: String,
}

impl PlainMechanism {
    /// Create the mechanism.
    pub fn new(username: impl Into<String>, password: Password, source: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password,
            source: source.into(),
        }
    }
}

impl SaslMechanism for PlainMechanism {
    fn name(&self) -> &'static str {
        "PLAIN"
    }

    fn database(&self) -> &str {
        &self.source
    }

    fn initialize(&mut self) -> Result<SaslStep, AuthErrorKind> {
        let payload = self.password.expose(|plain| {
            let mut buf = BytesMut::with_capacity(self.username.len() + plain.len() + 2);
            buf.put_u8(0);
            buf.put_slice(self.username.as_bytes());
            buf.put_u8(0);
            buf.put_slice(plain.as_bytes());
            buf.freeze()
        });
        Ok(SaslStep::complete(payload))
    }

    fn transition(&mut self, server_payload: &[u8]) -> Result<SaslStep, AuthErrorKind> {
        if server_payload.is_empty() {
            Ok(SaslStep::complete(Vec::new()))
        } else {
            Err(AuthErrorKind::unexpected(
                "PLAIN does not expect a server payload",
            ))
        }
    }
}

impl fmt::Debug for PlainMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainMechanism")
            .field("username", &self.username)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_layout() {
        let mut mechanism = PlainMechanism::new("user", Password::new("pencil"), "$external");
        let step = mechanism.initialize().unwrap();
        assert!(step.is_complete);
        assert_eq!(&step.payload[..], b"\0user\0pencil");
    }

    #[test]
    fn test_rejects_server_payload() {
        let mut mechanism = PlainMechanism::new("user", Password::new("pencil"), "$external");
        mechanism.initialize().unwrap();
        assert!(mechanism.transition(b"").unwrap().is_complete);
        assert!(mechanism.transition(b"x").is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let mechanism = PlainMechanism::new("user", Password::new("pencil"), "$external");
        assert!(!format!("{mechanism:?}").contains("pencil"));
    }
}
