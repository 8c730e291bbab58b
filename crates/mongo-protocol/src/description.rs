//! Handshake results and the per-connection description derived from them.

use bson::{Bson, Document};

use crate::error::ConnectionError;
use crate::ids::{ConnectionId, ServiceId};
use crate::reply;

/// Parsed reply to the initial `hello` command.
#[derive(Debug, Clone, PartialEq)]
pub struct HelloResult {
    max_wire_version: i32,
    server_connection_id: Option<i64>,
    service_id: Option<ServiceId>,
    sasl_supported_mechs: Option<Vec<String>>,
    speculative_authenticate: Option<Document>,
    raw: Document,
}

impl HelloResult {
    /// Parse a successful `hello` reply.
    pub fn parse(reply: Document) -> Result<Self, ConnectionError> {
        let reply = reply::into_command_result(reply)?;

        let max_wire_version = reply::get_i64(&reply, "maxWireVersion").unwrap_or(0) as i32;
        let server_connection_id = reply::get_i64(&reply, "connectionId");

        let service_id = match reply.get("serviceId") {
            None => None,
            Some(Bson::ObjectId(oid)) => Some(ServiceId::new(*oid)),
            Some(other) => {
                return Err(ConnectionError::protocol(format!(
                    "hello reply has a serviceId of unexpected type {:?}",
                    other.element_type()
                )));
            }
        };

        let sasl_supported_mechs = match reply.get("saslSupportedMechs") {
            None => None,
            Some(Bson::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_owned))
                    .collect(),
            ),
            Some(_) => {
                return Err(ConnectionError::protocol(
                    "hello reply has a saslSupportedMechs field that is not an array",
                ));
            }
        };

        let speculative_authenticate = reply.get_document("speculativeAuthenticate").ok().cloned();

        Ok(Self {
            max_wire_version,
            server_connection_id,
            service_id,
            sasl_supported_mechs,
            speculative_authenticate,
            raw: reply,
        })
    }

    /// Highest wire protocol version the server speaks.
    #[must_use]
    pub fn max_wire_version(&self) -> i32 {
        self.max_wire_version
    }

    /// Server-assigned connection id.
    #[must_use]
    pub fn server_connection_id(&self) -> Option<i64> {
        self.server_connection_id
    }

    /// Backend service id reported behind a load balancer.
    #[must_use]
    pub fn service_id(&self) -> Option<ServiceId> {
        self.service_id
    }

    /// SASL mechanisms the server advertises for the requested user.
    #[must_use]
    pub fn sasl_supported_mechs(&self) -> Option<&[String]> {
        self.sasl_supported_mechs.as_deref()
    }

    /// The server's answer to a speculative authentication attempt.
    #[must_use]
    pub fn speculative_authenticate(&self) -> Option<&Document> {
        self.speculative_authenticate.as_ref()
    }

    /// The reply as received.
    #[must_use]
    pub fn raw(&self) -> &Document {
        &self.raw
    }
}

/// What a connection learned about its server during the handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionDescription {
    connection_id: ConnectionId,
    hello: HelloResult,
}

impl ConnectionDescription {
    /// Combine the local connection id with the handshake reply.
    pub fn new(connection_id: ConnectionId, hello: HelloResult) -> Self {
        let connection_id = match hello.server_connection_id() {
            Some(server) => connection_id.with_server_value(server),
            None => connection_id,
        };
        Self {
            connection_id,
            hello,
        }
    }

    /// Connection id, including the server value when known.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// The parsed handshake reply.
    #[must_use]
    pub fn hello(&self) -> &HelloResult {
        &self.hello
    }

    /// Shortcut for the load-balanced service id.
    #[must_use]
    pub fn service_id(&self) -> Option<ServiceId> {
        self.hello.service_id()
    }

    /// Shortcut for the server's wire version.
    #[must_use]
    pub fn max_wire_version(&self) -> i32 {
        self.hello.max_wire_version()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bson::{doc, oid::ObjectId};

    use super::*;

    #[test]
    fn test_parse_full_hello() {
        let oid = ObjectId::new();
        let reply = doc! {
            "ok": 1.0,
            "isWritablePrimary": true,
            "maxWireVersion": 21,
            "connectionId": 99,
            "serviceId": oid,
            "saslSupportedMechs": ["SCRAM-SHA-1", "SCRAM-SHA-256"],
            "speculativeAuthenticate": { "conversationId": 1, "done": false },
        };

        let hello = HelloResult::parse(reply).unwrap();
        assert_eq!(hello.max_wire_version(), 21);
        assert_eq!(hello.server_connection_id(), Some(99));
        assert_eq!(hello.service_id(), Some(ServiceId::new(oid)));
        assert_eq!(
            hello.sasl_supported_mechs().unwrap(),
            &["SCRAM-SHA-1".to_owned(), "SCRAM-SHA-256".to_owned()]
        );
        assert!(hello.speculative_authenticate().is_some());

        let description = ConnectionDescription::new(ConnectionId::new(3), hello);
        assert_eq!(description.connection_id().server_value(), Some(99));
        assert_eq!(description.connection_id().local_value(), 3);
    }

    #[test]
    fn test_parse_minimal_hello() {
        let hello = HelloResult::parse(doc! { "ok": 1 }).unwrap();
        assert_eq!(hello.max_wire_version(), 0);
        assert!(hello.service_id().is_none());
        assert!(hello.sasl_supported_mechs().is_none());
    }

    #[test]
    fn test_parse_rejects_failed_hello() {
        let err = HelloResult::parse(doc! { "ok": 0, "errmsg": "no" }).unwrap_err();
        assert!(matches!(err, ConnectionError::Command { .. }));
    }

    #[test]
    fn test_parse_rejects_malformed_service_id() {
        let err = HelloResult::parse(doc! { "ok": 1, "serviceId": "abc" }).unwrap_err();
        assert!(matches!(err, ConnectionError::Protocol(_)));
    }

    proptest::proptest! {
        #[test]
        fn test_parse_is_total(
            ok in proptest::prelude::any::<bool>(),
            wire in proptest::prelude::any::<i64>(),
            mechs in proptest::collection::vec("[A-Z0-9-]{1,16}", 0..4),
        ) {
            let reply = doc! { "ok": ok, "maxWireVersion": wire, "saslSupportedMechs": mechs.clone() };
            match HelloResult::parse(reply) {
                Ok(hello) => {
                    proptest::prop_assert!(ok);
                    proptest::prop_assert_eq!(hello.sasl_supported_mechs().map(<[String]>::len), Some(mechs.len()));
                }
                Err(_) => proptest::prop_assert!(!ok),
            }
        }
    }
}
