//! SCRAM-SHA-1 and SCRAM-SHA-256 (RFC 5802, RFC 7677).
//!
//! ## Protocol Flow
//!
//! ```text
//! Client                              Server
//!   |--- saslStart: n,,n=user,r=cnonce -->|
//!   |<-- r=cnonce+snonce,s=salt,i=4096 ---|
//!   |--- c=biws,r=...,p=proof ----------->|  (saslContinue)
//!   |<-- v=server-signature --------------|  (done: true)
//! ```
//!
//! The two variants share one engine parameterized by [`ScramVersion`]:
//! the hash function and the way the password is prepared. SCRAM-SHA-1 uses
//! MongoDB's historical `md5("{user}:mongo:{password}")` digest in place of
//! the raw password; SCRAM-SHA-256 applies SASLprep.
//!
//! Derived client and server keys are cached in a [`ScramCache`] so repeated
//! handshakes against the same salt skip the expensive key derivation.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::credential::{AuthMechanism, Password};
use crate::digest;
use crate::error::AuthErrorKind;
use crate::random::RandomSource;
use crate::sasl::{SaslMechanism, SaslStep};
use crate::saslprep::saslprep;

/// Servers must ask for at least this many PBKDF2 rounds.
pub const MIN_ITERATION_COUNT: u32 = 4096;

/// Hash family of a SCRAM exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScramVersion {
    /// SCRAM-SHA-1.
    Sha1,
    /// SCRAM-SHA-256.
    Sha256,
}

impl ScramVersion {
    /// Matching mechanism.
    #[must_use]
    pub fn mechanism(self) -> AuthMechanism {
        match self {
            Self::Sha1 => AuthMechanism::ScramSha1,
            Self::Sha256 => AuthMechanism::ScramSha256,
        }
    }

    /// Wire name.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.mechanism().as_str()
    }

    fn prepare_password(
        self,
        username: &str,
        password: &Password,
    ) -> Result<Zeroizing<Vec<u8>>, AuthErrorKind> {
        match self {
            Self::Sha1 => {
                let digest = digest::mongo_password_digest(username, password);
                Ok(Zeroizing::new(digest.as_bytes().to_vec()))
            }
            Self::Sha256 => password.expose(|plain| {
                saslprep(plain)
                    .map(|prepared| Zeroizing::new(prepared.as_bytes().to_vec()))
                    .map_err(|e| AuthErrorKind::Credentials(e.to_string()))
            }),
        }
    }

    fn hi(self, password: &[u8], salt: &[u8], iterations: u32) -> Zeroizing<Vec<u8>> {
        match self {
            Self::Sha1 => {
                let mut out = Zeroizing::new(vec![0u8; 20]);
                pbkdf2::pbkdf2_hmac::<Sha1>(password, salt, iterations, &mut out);
                out
            }
            Self::Sha256 => {
                let mut out = Zeroizing::new(vec![0u8; 32]);
                pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
                out
            }
        }
    }

    fn hmac(self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, AuthErrorKind> {
        let invalid = |_| AuthErrorKind::Credentials("HMAC rejected the derived key".into());
        match self {
            Self::Sha1 => {
                let mut mac = Hmac::<Sha1>::new_from_slice(key).map_err(invalid)?;
                mac.update(data);
                Ok(mac.finalize().into_bytes().to_vec())
            }
            Self::Sha256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(invalid)?;
                mac.update(data);
                Ok(mac.finalize().into_bytes().to_vec())
            }
        }
    }

    fn h(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(data).to_vec(),
            Self::Sha256 => Sha256::digest(data).to_vec(),
        }
    }
}

/// Cache key: prepared password, salt and iteration count.
///
/// Equality compares the password in constant time. The hash only covers the
/// salt and iteration count so secret material never feeds a hasher.
#[derive(Clone)]
pub struct ScramCacheKey {
    password: Zeroizing<Vec<u8>>,
    salt: Vec<u8>,
    iterations: u32,
}

impl ScramCacheKey {
    fn new(password: &[u8], salt: &[u8], iterations: u32) -> Self {
        Self {
            password: Zeroizing::new(password.to_vec()),
            salt: salt.to_vec(),
            iterations,
        }
    }
}

impl PartialEq for ScramCacheKey {
    fn eq(&self, other: &Self) -> bool {
        let same_password: bool = self.password.as_slice().ct_eq(other.password.as_slice()).into();
        same_password && self.salt == other.salt && self.iterations == other.iterations
    }
}

impl Eq for ScramCacheKey {}

impl Hash for ScramCacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.salt.hash(state);
        self.iterations.hash(state);
    }
}

impl fmt::Debug for ScramCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScramCacheKey")
            .field("password", &"[REDACTED]")
            .field("salt", &BASE64.encode(&self.salt))
            .field("iterations", &self.iterations)
            .finish()
    }
}

/// Keys derived from a salted password.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ScramCacheEntry {
    client_key: Vec<u8>,
    server_key: Vec<u8>,
}

impl fmt::Debug for ScramCacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ScramCacheEntry([REDACTED])")
    }
}

/// Remembers the most recently derived keys.
///
/// One cache is shared by every connection authenticating with the same
/// credential; a single slot suffices because the salt only changes when the
/// user's password does.
#[derive(Debug, Default)]
pub struct ScramCache {
    slot: Mutex<Option<(ScramCacheKey, ScramCacheEntry)>>,
}

impl ScramCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys for `key`, if cached.
    pub fn try_get(&self, key: &ScramCacheKey) -> Option<ScramCacheEntry> {
        match &*self.slot.lock() {
            Some((cached, entry)) if cached == key => Some(entry.clone()),
            _ => None,
        }
    }

    /// Replace the cached keys.
    pub fn add(&self, key: ScramCacheKey, entry: ScramCacheEntry) {
        *self.slot.lock() = Some((key, entry));
    }

    /// Whether anything is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }
}

enum ScramState {
    Initial,
    ClientFirstSent {
        client_nonce: String,
        client_first_bare: String,
    },
    ClientFinalSent {
        server_signature: Zeroizing<Vec<u8>>,
    },
    Complete,
}

/// SCRAM step logic for one connection.
pub struct ScramMechanism {
    version: ScramVersion,
    username: String,
    password: Password,
    source: String,
    cache: Arc<ScramCache>,
    random: Arc<dyn RandomSource>,
    state: ScramState,
}

impl ScramMechanism {
    /// Create the mechanism for one conversation.
    pub fn new(
        version: ScramVersion,
        username: impl Into<String>,
        password: Password,
        source: impl Into<String>,
        cache: Arc<ScramCache>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            version,
            username: username.into(),
            password,
            source: source.into(),
            cache,
            random,
            state: ScramState::Initial,
        }
    }

    /// Hash family in use.
    #[must_use]
    pub fn version(&self) -> ScramVersion {
        self.version
    }

    fn client_final(
        &mut self,
        client_nonce: &str,
        client_first_bare: &str,
        server_first: &[u8],
    ) -> Result<SaslStep, AuthErrorKind> {
        let server_first = utf8(server_first, "server-first-message")?;
        if let Some(error) = server_first.strip_prefix("e=") {
            return Err(AuthErrorKind::ServerError(error.to_owned()));
        }

        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;
        for part in server_first.split(',') {
            if let Some(value) = part.strip_prefix("r=") {
                nonce = Some(value);
            } else if let Some(value) = part.strip_prefix("s=") {
                salt = Some(
                    BASE64
                        .decode(value)
                        .map_err(|e| AuthErrorKind::unexpected(format!("Invalid salt: {e}")))?,
                );
            } else if let Some(value) = part.strip_prefix("i=") {
                iterations = Some(value.parse::<u32>().map_err(|e| {
                    AuthErrorKind::unexpected(format!("Invalid iteration count: {e}"))
                })?);
            }
        }

        let nonce = nonce.ok_or_else(|| missing("r"))?;
        let salt = salt.ok_or_else(|| missing("s"))?;
        let iterations = iterations.ok_or_else(|| missing("i"))?;

        if !nonce.starts_with(client_nonce) {
            return Err(AuthErrorKind::InvalidNonce);
        }
        if iterations < MIN_ITERATION_COUNT {
            return Err(AuthErrorKind::InvalidIterationCount {
                count: iterations,
                minimum: MIN_ITERATION_COUNT,
            });
        }

        let keys = self.derive_keys(&salt, iterations)?;

        let without_proof = format!("c=biws,r={nonce}");
        let auth_message = format!("{client_first_bare},{server_first},{without_proof}");

        let stored_key = self.version.h(&keys.client_key);
        let client_signature = self.version.hmac(&stored_key, auth_message.as_bytes())?;
        let proof: Vec<u8> = keys
            .client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(k, s)| k ^ s)
            .collect();
        let server_signature = self.version.hmac(&keys.server_key, auth_message.as_bytes())?;

        self.state = ScramState::ClientFinalSent {
            server_signature: Zeroizing::new(server_signature),
        };

        let message = format!("{without_proof},p={}", BASE64.encode(proof));
        Ok(SaslStep::next(message.into_bytes()))
    }

    fn derive_keys(&self, salt: &[u8], iterations: u32) -> Result<ScramCacheEntry, AuthErrorKind> {
        let prepared = self.version.prepare_password(&self.username, &self.password)?;
        let key = ScramCacheKey::new(&prepared, salt, iterations);
        if let Some(entry) = self.cache.try_get(&key) {
            return Ok(entry);
        }

        let salted = self.version.hi(&prepared, salt, iterations);
        let entry = ScramCacheEntry {
            client_key: self.version.hmac(&salted, b"Client Key")?,
            server_key: self.version.hmac(&salted, b"Server Key")?,
        };
        self.cache.add(key, entry.clone());
        Ok(entry)
    }
}

impl SaslMechanism for ScramMechanism {
    fn name(&self) -> &'static str {
        self.version.name()
    }

    fn database(&self) -> &str {
        &self.source
    }

    fn initialize(&mut self) -> Result<SaslStep, AuthErrorKind> {
        let client_nonce = self.random.scram_nonce();
        let client_first_bare = format!("n={},r={}", escape_username(&self.username), client_nonce);
        let message = format!("n,,{client_first_bare}");
        self.state = ScramState::ClientFirstSent {
            client_nonce,
            client_first_bare,
        };
        Ok(SaslStep::next(message.into_bytes()))
    }

    fn transition(&mut self, server_payload: &[u8]) -> Result<SaslStep, AuthErrorKind> {
        match std::mem::replace(&mut self.state, ScramState::Complete) {
            ScramState::Initial => Err(AuthErrorKind::unexpected(
                "SCRAM conversation has not been started",
            )),
            ScramState::ClientFirstSent {
                client_nonce,
                client_first_bare,
            } => self.client_final(&client_nonce, &client_first_bare, server_payload),
            ScramState::ClientFinalSent { server_signature } => {
                let server_final = utf8(server_payload, "server-final-message")?;
                if let Some(error) = server_final.strip_prefix("e=") {
                    return Err(AuthErrorKind::ServerError(error.to_owned()));
                }
                let encoded = server_final
                    .split(',')
                    .find_map(|part| part.strip_prefix("v="))
                    .ok_or_else(|| missing("v"))?;
                let received = BASE64
                    .decode(encoded)
                    .map_err(|e| AuthErrorKind::unexpected(format!("Invalid server signature: {e}")))?;
                if !bool::from(received.as_slice().ct_eq(server_signature.as_slice())) {
                    return Err(AuthErrorKind::InvalidServerSignature);
                }
                Ok(SaslStep::complete(Bytes::new()))
            }
            ScramState::Complete if server_payload.is_empty() => Ok(SaslStep::complete(Bytes::new())),
            ScramState::Complete => Err(AuthErrorKind::unexpected(
                "Invalid final SCRAM message: unexpected extra bytes",
            )),
        }
    }
}

impl fmt::Debug for ScramMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScramMechanism")
            .field("version", &self.version)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("source", &self.source)
            .finish()
    }
}

/// Escape `=` and `,` in a SCRAM username.
pub fn escape_username(username: &str) -> String {
    username.replace('=', "=3D").replace(',', "=2C")
}

fn utf8<'a>(payload: &'a [u8], what: &str) -> Result<&'a str, AuthErrorKind> {
    std::str::from_utf8(payload)
        .map_err(|_| AuthErrorKind::unexpected(format!("Invalid {what}: not valid UTF-8")))
}

fn missing(field: &str) -> AuthErrorKind {
    AuthErrorKind::unexpected(format!("Invalid SCRAM message: missing field {field}"))
}
