//! The SASL conversation driver shared by every SASL mechanism.
//!
//! A mechanism only knows how to turn the server's last payload into its next
//! message ([`SaslMechanism::transition`]). [`converse`] owns the
//! `saslStart`/`saslContinue` loop and stops once the server reports `done`
//! and the mechanism reports its own step complete. Either side finishing
//! alone is not enough, so a mechanism that still has to verify the server's
//! final proof always gets to see it.

use bson::{Bson, Document, doc, spec::BinarySubtype};
use bytes::Bytes;
use mongo_protocol::{Connection, reply};
use tokio_util::sync::CancellationToken;

use crate::error::{AuthError, AuthErrorKind};

/// One client message of a SASL conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslStep {
    /// Bytes to send to the server, possibly empty.
    pub payload: Bytes,
    /// Whether the client side of the exchange is finished.
    pub is_complete: bool,
}

impl SaslStep {
    /// A step that expects another server message.
    pub fn next(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            is_complete: false,
        }
    }

    /// The last client step.
    pub fn complete(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            is_complete: true,
        }
    }
}

/// Mechanism-specific step logic.
///
/// Implementors keep their conversation state as a private enum and move
/// through it on each call.
pub trait SaslMechanism: Send + Sync {
    /// Wire name, e.g. `SCRAM-SHA-256`.
    fn name(&self) -> &'static str;

    /// Database the conversation runs against.
    fn database(&self) -> &str;

    /// Produce the first client message and reset any previous state.
    fn initialize(&mut self) -> Result<SaslStep, AuthErrorKind>;

    /// Consume a server payload and produce the next client message.
    fn transition(&mut self, server_payload: &[u8]) -> Result<SaslStep, AuthErrorKind>;
}

/// Build the `saslStart` command for a first step.
pub fn sasl_start_command(mechanism: &str, step: &SaslStep) -> Document {
    doc! {
        "saslStart": 1,
        "mechanism": mechanism,
        "payload": binary(&step.payload),
        "options": { "skipEmptyExchange": true },
    }
}

/// Build the `speculativeAuthenticate` form of `saslStart`, which must name its database.
pub fn speculative_sasl_start(mechanism: &dyn SaslMechanism, step: &SaslStep) -> Document {
    let mut command = sasl_start_command(mechanism.name(), step);
    command.insert("db", mechanism.database());
    command
}

fn sasl_continue_command(conversation_id: Bson, step: &SaslStep) -> Document {
    doc! {
        "saslContinue": 1,
        "conversationId": conversation_id,
        "payload": binary(&step.payload),
    }
}

fn binary(payload: &[u8]) -> Bson {
    Bson::Binary(bson::Binary {
        subtype: BinarySubtype::Generic,
        bytes: payload.to_vec(),
    })
}

/// Run a SASL conversation over `connection`.
///
/// With `speculative_reply` set, the first step was already carried by the
/// handshake and the loop resumes from the server's answer to it instead of
/// sending `saslStart`.
pub async fn converse<M>(
    mechanism: &mut M,
    connection: &mut dyn Connection,
    speculative_reply: Option<&Document>,
    cancel: &CancellationToken,
) -> Result<(), AuthError>
where
    M: SaslMechanism + ?Sized,
{
    let connection_id = connection.id();
    let name = mechanism.name();
    let fail = |kind: AuthErrorKind| AuthError::new(connection_id, name, kind);
    let database = mechanism.database().to_owned();

    let (mut reply, mut local_complete) = match speculative_reply {
        Some(reply) => {
            tracing::debug!(connection_id = %connection_id, mechanism = name, "resuming speculative authentication");
            (reply.clone(), false)
        }
        None => {
            let step = mechanism.initialize().map_err(fail)?;
            let command = sasl_start_command(name, &step);
            let reply = connection
                .run_command(&database, command, cancel)
                .await
                .map_err(|e| fail(e.into()))?;
            (reply, step.is_complete)
        }
    };

    loop {
        let conversation_id = reply
            .get("conversationId")
            .cloned()
            .ok_or_else(|| fail(AuthErrorKind::unexpected("SASL reply is missing a conversationId")))?;
        let server_done = reply::get_flag(&reply, "done").unwrap_or(false);

        if server_done && local_complete {
            break;
        }

        let server_payload = reply::get_binary(&reply, "payload").unwrap_or_default();
        let step = mechanism.transition(server_payload).map_err(fail)?;
        local_complete = step.is_complete;

        if server_done {
            if local_complete {
                break;
            }
            return Err(fail(AuthErrorKind::unexpected(
                "Server completed the SASL conversation before the client.",
            )));
        }

        let command = sasl_continue_command(conversation_id, &step);
        reply = connection
            .run_command(&database, command, cancel)
            .await
            .map_err(|e| fail(e.into()))?;
    }

    tracing::debug!(connection_id = %connection_id, mechanism = name, "SASL conversation complete");
    Ok(())
}
