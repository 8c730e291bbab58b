//! Reply documents as a server would send them.

use bson::{Binary, Bson, Document, doc, oid::ObjectId, spec::BinarySubtype};

/// `{ok: 1}`.
#[must_use]
pub fn ok() -> Document {
    doc! { "ok": 1 }
}

/// A minimal `hello` reply from a primary.
#[must_use]
pub fn hello(server_connection_id: i64) -> Document {
    doc! {
        "ok": 1,
        "isWritablePrimary": true,
        "helloOk": true,
        "maxWireVersion": 21,
        "connectionId": server_connection_id,
    }
}

/// A `hello` reply from behind a load balancer.
#[must_use]
pub fn hello_with_service(server_connection_id: i64, service_id: ObjectId) -> Document {
    let mut reply = hello(server_connection_id);
    reply.insert("serviceId", service_id);
    reply
}

/// A failed command.
#[must_use]
pub fn command_error(code: i32, code_name: &str, message: &str) -> Document {
    doc! { "ok": 0, "code": code, "codeName": code_name, "errmsg": message }
}

/// A `saslStart`/`saslContinue` reply.
#[must_use]
pub fn sasl(conversation_id: i32, payload: &[u8], done: bool) -> Document {
    doc! {
        "ok": 1,
        "conversationId": conversation_id,
        "done": done,
        "payload": binary(payload),
    }
}

/// Wrap bytes as generic BSON binary.
#[must_use]
pub fn binary(bytes: &[u8]) -> Bson {
    Bson::Binary(Binary {
        subtype: BinarySubtype::Generic,
        bytes: bytes.to_vec(),
    })
}
