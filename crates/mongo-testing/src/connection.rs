//! A scripted connection.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bson::Document;
use mongo_protocol::{
    CancellationToken, Connection, ConnectionDescription, ConnectionError, ConnectionId, Endpoint,
    ServerId, reply,
};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

/// A command a mock connection received.
#[derive(Debug, Clone, PartialEq)]
pub struct SentCommand {
    /// Target database.
    pub database: String,
    /// The command document.
    pub command: Document,
}

impl SentCommand {
    /// The command name (its first key).
    #[must_use]
    pub fn name(&self) -> &str {
        self.command.keys().next().map_or("", String::as_str)
    }
}

#[derive(Debug, Default)]
struct ProbeState {
    commands: Mutex<Vec<SentCommand>>,
    open_attempts: AtomicUsize,
    opened: AtomicBool,
    expired: AtomicBool,
    dropped: AtomicBool,
}

/// Observes a [`MockConnection`] after it has been handed away.
#[derive(Debug, Clone, Default)]
pub struct ConnectionProbe {
    state: Arc<ProbeState>,
}

impl ConnectionProbe {
    /// Commands received, oldest first.
    #[must_use]
    pub fn commands(&self) -> Vec<SentCommand> {
        self.state.commands.lock().clone()
    }

    /// Names of the commands received.
    #[must_use]
    pub fn command_names(&self) -> Vec<String> {
        self.state
            .commands
            .lock()
            .iter()
            .map(|c| c.name().to_owned())
            .collect()
    }

    /// Times `open` was called.
    #[must_use]
    pub fn open_attempts(&self) -> usize {
        self.state.open_attempts.load(Ordering::SeqCst)
    }

    /// Whether `open` succeeded.
    #[must_use]
    pub fn is_opened(&self) -> bool {
        self.state.opened.load(Ordering::SeqCst)
    }

    /// Whether the connection has been dropped (closed).
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.state.dropped.load(Ordering::SeqCst)
    }

    /// Make the connection report itself expired.
    pub fn set_expired(&self, expired: bool) {
        self.state.expired.store(expired, Ordering::SeqCst);
    }
}

enum Scripted {
    Reply(Document),
    Error(ConnectionError),
    Stall,
}

/// A [`Connection`] answering from a queue of replies.
///
/// `hello` commands that find the queue empty get the configured hello
/// reply; any other command with nothing queued fails with a protocol error.
pub struct MockConnection {
    id: ConnectionId,
    server_id: ServerId,
    description: Option<ConnectionDescription>,
    script: VecDeque<Scripted>,
    hello_reply: Document,
    open_gate: Option<Arc<Semaphore>>,
    open_failure: Option<String>,
    probe: ConnectionProbe,
}

impl MockConnection {
    /// A connection with local id `local_id` to the default endpoint.
    #[must_use]
    pub fn new(local_id: u64) -> Self {
        Self {
            id: ConnectionId::new(local_id),
            server_id: ServerId::new(1, Endpoint::default()),
            description: None,
            script: VecDeque::new(),
            hello_reply: crate::reply::hello(local_id as i64),
            open_gate: None,
            open_failure: None,
            probe: ConnectionProbe::default(),
        }
    }

    /// Set the server.
    #[must_use]
    pub fn with_server_id(mut self, server_id: ServerId) -> Self {
        self.server_id = server_id;
        self
    }

    /// Queue a reply; `ok: 0` replies surface as command errors.
    #[must_use]
    pub fn with_reply(mut self, reply: Document) -> Self {
        self.script.push_back(Scripted::Reply(reply));
        self
    }

    /// Queue a transport failure.
    #[must_use]
    pub fn with_error(mut self, error: ConnectionError) -> Self {
        self.script.push_back(Scripted::Error(error));
        self
    }

    /// Queue a command that never gets an answer; it fails once the
    /// caller cancels.
    #[must_use]
    pub fn with_stall(mut self) -> Self {
        self.script.push_back(Scripted::Stall);
        self
    }

    /// Reply used for `hello` when nothing is queued.
    #[must_use]
    pub fn with_hello_reply(mut self, reply: Document) -> Self {
        self.hello_reply = reply;
        self
    }

    /// Make `open` wait for one permit of `gate` (the permit is consumed).
    #[must_use]
    pub fn with_open_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.open_gate = Some(gate);
        self
    }

    /// Make `open` fail with a refused connection.
    #[must_use]
    pub fn with_open_failure(mut self, message: impl Into<String>) -> Self {
        self.open_failure = Some(message.into());
        self
    }

    /// A probe sharing this connection's state.
    #[must_use]
    pub fn probe(&self) -> ConnectionProbe {
        self.probe.clone()
    }

    fn next_reply(&mut self, command: &SentCommand) -> Result<Document, ConnectionError> {
        match self.script.pop_front() {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Error(error)) => Err(error),
            Some(Scripted::Stall) => Err(ConnectionError::Cancelled),
            None if command.name() == "hello" => Ok(self.hello_reply.clone()),
            None => Err(ConnectionError::protocol(format!(
                "no scripted reply for {}",
                command.name()
            ))),
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn id(&self) -> ConnectionId {
        self.description
            .as_ref()
            .map_or(self.id, ConnectionDescription::connection_id)
    }

    fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    fn description(&self) -> Option<&ConnectionDescription> {
        self.description.as_ref()
    }

    fn set_description(&mut self, description: ConnectionDescription) {
        self.description = Some(description);
    }

    fn is_expired(&self) -> bool {
        self.probe.state.expired.load(Ordering::SeqCst)
    }

    async fn open(&mut self, cancel: &CancellationToken) -> Result<(), ConnectionError> {
        self.probe.state.open_attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.open_gate {
            tokio::select! {
                permit = gate.acquire() => match permit {
                    Ok(permit) => permit.forget(),
                    Err(_) => return Err(ConnectionError::Closed),
                },
                () = cancel.cancelled() => return Err(ConnectionError::Cancelled),
            }
        }
        if let Some(message) = &self.open_failure {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, message.clone()).into());
        }

        self.probe.state.opened.store(true, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "mock connection opened");
        Ok(())
    }

    async fn run_command(
        &mut self,
        database: &str,
        command: Document,
        cancel: &CancellationToken,
    ) -> Result<Document, ConnectionError> {
        if cancel.is_cancelled() {
            return Err(ConnectionError::Cancelled);
        }
        let sent = SentCommand {
            database: database.to_owned(),
            command,
        };
        if matches!(self.script.front(), Some(Scripted::Stall)) {
            self.script.pop_front();
            self.probe.state.commands.lock().push(sent);
            cancel.cancelled().await;
            return Err(ConnectionError::Cancelled);
        }
        let result = self.next_reply(&sent);
        self.probe.state.commands.lock().push(sent);
        reply::into_command_result(result?)
    }
}

impl std::fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnection")
            .field("id", &self.id)
            .field("server_id", &self.server_id)
            .field("queued", &self.script.len())
            .finish_non_exhaustive()
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.probe.state.dropped.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use bson::doc;

    #[tokio::test]
    async fn test_replies_in_order_then_default_hello() {
        let cancel = CancellationToken::new();
        let mut connection = MockConnection::new(3)
            .with_reply(doc! { "ok": 1, "n": 1 })
            .with_reply(crate::reply::command_error(18, "AuthenticationFailed", "nope"));
        let probe = connection.probe();

        let first = connection.run_command("admin", doc! { "ping": 1 }, &cancel).await.unwrap();
        assert_eq!(first.get_i32("n").unwrap(), 1);

        let err = connection.run_command("admin", doc! { "ping": 1 }, &cancel).await.unwrap_err();
        assert_eq!(err.code(), Some(18));

        let hello = connection.run_command("admin", doc! { "hello": 1 }, &cancel).await.unwrap();
        assert_eq!(hello.get_i64("connectionId").unwrap(), 3);

        assert!(connection.run_command("admin", doc! { "find": "x" }, &cancel).await.is_err());
        assert_eq!(probe.command_names(), ["ping", "ping", "hello", "find"]);
    }

    #[tokio::test]
    async fn test_open_gate_and_cancel() {
        let gate = Arc::new(Semaphore::new(0));
        let mut connection = MockConnection::new(1).with_open_gate(Arc::clone(&gate));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(connection.open(&cancel).await, Err(ConnectionError::Cancelled)));

        gate.add_permits(1);
        connection.open(&CancellationToken::new()).await.unwrap();
        assert!(connection.probe().is_opened());
        assert_eq!(gate.available_permits(), 0);
    }

    #[tokio::test]
    async fn test_drop_is_observable() {
        let connection = MockConnection::new(1).with_open_failure("refused");
        let probe = connection.probe();
        let mut connection = connection;
        assert!(connection.open(&CancellationToken::new()).await.unwrap_err().is_network_error());
        drop(connection);
        assert!(probe.is_dropped());
    }
}
