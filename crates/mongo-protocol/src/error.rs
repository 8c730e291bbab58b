//! Connection-level error types.

use thiserror::Error;

/// Errors raised by a connection while opening the transport or running a command.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectionError {
    /// Transport-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed by the peer or locally.
    #[error("connection closed")]
    Closed,

    /// The server answered a command with `ok: 0`.
    #[error("command failed with code {code} ({code_name}): {message}")]
    Command {
        /// Server error code.
        code: i32,
        /// Symbolic error code name, empty if the server omitted it.
        code_name: String,
        /// Server error message.
        message: String,
    },

    /// The reply did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An I/O deadline elapsed.
    #[error("operation timed out")]
    Timeout,

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl ConnectionError {
    /// Create a protocol error from anything displayable.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Whether the error came from the network rather than from the server.
    #[must_use]
    pub fn is_network_error(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Closed | Self::Timeout)
    }

    /// Server error code, if this is a command failure.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Command { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_classification() {
        let io = ConnectionError::from(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert!(io.is_network_error());
        assert!(ConnectionError::Closed.is_network_error());
        assert!(!ConnectionError::protocol("bad reply").is_network_error());
        assert!(!ConnectionError::Cancelled.is_network_error());
    }

    #[test]
    fn test_command_display() {
        let err = ConnectionError::Command {
            code: 18,
            code_name: "AuthenticationFailed".into(),
            message: "Authentication failed.".into(),
        };
        assert_eq!(err.code(), Some(18));
        assert_eq!(
            err.to_string(),
            "command failed with code 18 (AuthenticationFailed): Authentication failed."
        );
    }
}
