//! Helpers for reading command replies.
//!
//! Servers encode numeric fields loosely (`ok` may arrive as a double, an
//! int32, an int64 or a boolean), so reads go through these helpers instead
//! of the strictly-typed `Document` getters.

use bson::{Bson, Document};

use crate::error::ConnectionError;

/// Read a numeric field as `i64`, accepting any BSON number type.
#[must_use]
pub fn get_i64(doc: &Document, key: &str) -> Option<i64> {
    match doc.get(key)? {
        Bson::Int32(v) => Some(i64::from(*v)),
        Bson::Int64(v) => Some(*v),
        Bson::Double(v) if v.fract() == 0.0 => Some(*v as i64),
        _ => None,
    }
}

/// Read a boolean-ish field: booleans as-is, numbers as non-zero.
#[must_use]
pub fn get_flag(doc: &Document, key: &str) -> Option<bool> {
    match doc.get(key)? {
        Bson::Boolean(v) => Some(*v),
        Bson::Int32(v) => Some(*v != 0),
        Bson::Int64(v) => Some(*v != 0),
        Bson::Double(v) => Some(*v != 0.0),
        _ => None,
    }
}

/// Whether the reply reports success.
#[must_use]
pub fn is_ok(reply: &Document) -> bool {
    get_flag(reply, "ok").unwrap_or(false)
}

/// Turn an `ok: 0` reply into [`ConnectionError::Command`].
pub fn into_command_result(reply: Document) -> Result<Document, ConnectionError> {
    if is_ok(&reply) {
        return Ok(reply);
    }

    let code = get_i64(&reply, "code").unwrap_or(0) as i32;
    let code_name = reply.get_str("codeName").unwrap_or_default().to_owned();
    let message = reply
        .get_str("errmsg")
        .unwrap_or("command failed without an error message")
        .to_owned();

    Err(ConnectionError::Command {
        code,
        code_name,
        message,
    })
}

/// Read a binary field's bytes regardless of subtype.
#[must_use]
pub fn get_binary<'a>(doc: &'a Document, key: &str) -> Option<&'a [u8]> {
    match doc.get(key)? {
        Bson::Binary(binary) => Some(&binary.bytes),
        _ => None,
    }
}
