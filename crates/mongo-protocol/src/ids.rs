//! Identifiers for servers, connections and load-balanced services.

use std::fmt;

use bson::oid::ObjectId;

/// A `host:port` pair the driver connects to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Default MongoDB port.
    pub const DEFAULT_PORT: u16 = 27017;

    /// Create an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new("localhost", Self::DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Identifies one server within one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerId {
    cluster_id: u64,
    endpoint: Endpoint,
}

impl ServerId {
    /// Create a server id.
    pub fn new(cluster_id: u64, endpoint: Endpoint) -> Self {
        Self {
            cluster_id,
            endpoint,
        }
    }

    /// Owning cluster.
    #[must_use]
    pub fn cluster_id(&self) -> u64 {
        self.cluster_id
    }

    /// Server endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ cluster: {}, endpoint: {} }}", self.cluster_id, self.endpoint)
    }
}

/// Identifies a connection.
///
/// The local value is assigned by the driver when the connection object is
/// created; the server value is learned from the handshake reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    local: u64,
    server: Option<i64>,
}

impl ConnectionId {
    /// Create an id with only a local value.
    #[must_use]
    pub fn new(local: u64) -> Self {
        Self {
            local,
            server: None,
        }
    }

    /// Attach the server-assigned value.
    #[must_use]
    pub fn with_server_value(self, server: i64) -> Self {
        Self {
            server: Some(server),
            ..self
        }
    }

    /// Driver-assigned value.
    #[must_use]
    pub fn local_value(&self) -> u64 {
        self.local
    }

    /// Server-assigned value, if known.
    #[must_use]
    pub fn server_value(&self) -> Option<i64> {
        self.server
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.server {
            Some(server) => write!(f, "{} (server {})", self.local, server),
            None => write!(f, "{}", self.local),
        }
    }
}

/// Identifies the backend behind a load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(ObjectId);

impl ServiceId {
    /// Wrap a server-reported object id.
    #[must_use]
    pub fn new(oid: ObjectId) -> Self {
        Self(oid)
    }

    /// Generate a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(ObjectId::new())
    }

    /// Underlying object id.
    #[must_use]
    pub fn oid(&self) -> ObjectId {
        self.0
    }
}

impl From<ObjectId> for ServiceId {
    fn from(oid: ObjectId) -> Self {
        Self(oid)
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "7");
        assert_eq!(id.with_server_value(42).to_string(), "7 (server 42)");
    }

    #[test]
    fn test_server_id_equality() {
        let a = ServerId::new(1, Endpoint::new("db0", 27017));
        let b = ServerId::new(1, Endpoint::new("db0", 27017));
        let c = ServerId::new(2, Endpoint::new("db0", 27017));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.endpoint().to_string(), "db0:27017");
    }

    #[test]
    fn test_service_ids_are_unique() {
        assert_ne!(ServiceId::generate(), ServiceId::generate());
    }
}
