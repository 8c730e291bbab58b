//! Small digest helpers shared by the legacy and SCRAM-SHA-1 mechanisms.

use std::fmt::Write;

use md5::{Digest, Md5};
use zeroize::Zeroizing;

use crate::credential::Password;

/// Lowercase hex encoding.
pub(crate) fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// `hex(md5(data))`.
pub(crate) fn md5_hex(data: &[u8]) -> String {
    hex(&Md5::digest(data))
}

/// MongoDB's stored password digest: `hex(md5("{user}:mongo:{password}"))`.
pub(crate) fn mongo_password_digest(username: &str, password: &Password) -> Zeroizing<String> {
    password.expose(|plain| {
        let input = Zeroizing::new(format!("{username}:mongo:{plain}"));
        Zeroizing::new(md5_hex(input.as_bytes()))
    })
}
