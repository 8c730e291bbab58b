//! A factory handing out [`MockConnection`]s.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use mongo_protocol::{Connection, ConnectionFactory, Endpoint, ServerId, ServiceId};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::connection::{ConnectionProbe, MockConnection};
use crate::reply;

type Script = Box<dyn Fn(MockConnection) -> MockConnection + Send + Sync>;

/// Creates mock connections with sequential local ids, starting at 1.
#[derive(Default)]
pub struct MockConnectionFactory {
    next_id: AtomicU64,
    probes: Mutex<Vec<ConnectionProbe>>,
    service_id: Mutex<Option<ServiceId>>,
    open_gate: Option<Arc<Semaphore>>,
    failing_opens: AtomicUsize,
    script: Option<Script>,
}

impl MockConnectionFactory {
    /// A factory whose connections open immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `open` waits for one permit of `gate`.
    #[must_use]
    pub fn with_open_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.open_gate = Some(gate);
        self
    }

    /// Customize every connection, e.g. to queue authentication replies.
    #[must_use]
    pub fn with_script(
        mut self,
        script: impl Fn(MockConnection) -> MockConnection + Send + Sync + 'static,
    ) -> Self {
        self.script = Some(Box::new(script));
        self
    }

    /// Connections created from now on report `service_id` in their `hello`.
    pub fn set_service_id(&self, service_id: Option<ServiceId>) {
        *self.service_id.lock() = service_id;
    }

    /// The next `count` connections fail to open.
    pub fn fail_next_opens(&self, count: usize) {
        self.failing_opens.store(count, Ordering::SeqCst);
    }

    /// Number of connections created.
    #[must_use]
    pub fn created(&self) -> usize {
        self.probes.lock().len()
    }

    /// Probes of every connection created, in creation order.
    #[must_use]
    pub fn probes(&self) -> Vec<ConnectionProbe> {
        self.probes.lock().clone()
    }

    /// Probe of the `index`-th connection created.
    #[must_use]
    pub fn probe(&self, index: usize) -> Option<ConnectionProbe> {
        self.probes.lock().get(index).cloned()
    }

    fn take_failing_open(&self) -> bool {
        self.failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl ConnectionFactory for MockConnectionFactory {
    fn create_connection(&self, server_id: &ServerId, _endpoint: &Endpoint) -> Box<dyn Connection> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let hello = match *self.service_id.lock() {
            Some(service_id) => reply::hello_with_service(id as i64, service_id.oid()),
            None => reply::hello(id as i64),
        };

        let mut connection = MockConnection::new(id)
            .with_server_id(server_id.clone())
            .with_hello_reply(hello);
        if let Some(gate) = &self.open_gate {
            connection = connection.with_open_gate(Arc::clone(gate));
        }
        if self.take_failing_open() {
            connection = connection.with_open_failure("connection refused");
        }
        if let Some(script) = &self.script {
            connection = script(connection);
        }

        self.probes.lock().push(connection.probe());
        Box::new(connection)
    }
}

impl std::fmt::Debug for MockConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnectionFactory")
            .field("created", &self.created())
            .field("service_id", &*self.service_id.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use mongo_protocol::CancellationToken;

    #[tokio::test]
    async fn test_sequential_ids_and_failing_opens() {
        let factory = MockConnectionFactory::new();
        factory.fail_next_opens(1);
        let server = ServerId::new(1, Endpoint::default());

        let mut first = factory.create_connection(&server, server.endpoint());
        let mut second = factory.create_connection(&server, server.endpoint());
        assert_eq!(first.id().local_value(), 1);
        assert_eq!(second.id().local_value(), 2);

        let cancel = CancellationToken::new();
        assert!(first.open(&cancel).await.is_err());
        assert!(second.open(&cancel).await.is_ok());
        assert_eq!(factory.created(), 2);
        assert!(factory.probe(1).unwrap().is_opened());
    }
}
