//! Client error types.

use thiserror::Error;

use msglink_protocol::ProtocolError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised by the transports the client drives.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection is gone.
    #[error("transport closed")]
    Closed,

    /// IO error on the underlying stream.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing or encoding error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The remote end refused the transfer (bad ticket, checksum mismatch, ...).
    #[error("rejected by remote: {reason}")]
    Rejected { reason: String },
}

impl TransportError {
    /// Creates a rejection error.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No correlated response arrived within the timeout after all retries.
    #[error("timeout waiting for {command} after {attempts} attempt(s)")]
    Timeout { command: String, attempts: u32 },

    /// The response could not be decoded or was not an expected variant.
    #[error("malformed response to {command}: {detail}")]
    Malformed { command: String, detail: String },

    /// The account lacks operator permission in the group.
    #[error("permission denied in group {group_code}")]
    PermissionDenied { group_code: u64 },

    /// The group is not known to the roster.
    #[error("group {group_code} not found")]
    UnknownGroup { group_code: u64 },

    /// The server refused to accept the content even as a long message.
    #[error("message content is too large ({size} bytes)")]
    ContentTooLarge { size: usize },

    /// The side-channel upload failed.
    #[error("upload failed: {reason}")]
    UploadFailed { reason: String },

    /// The server rejected a recall request.
    #[error("failed to recall message #{message_id}: {detail}")]
    RecallRejected { message_id: i64, detail: String },

    /// The server explicitly rejected an otherwise valid request.
    #[error("{command} failed: {detail}")]
    Failure { command: String, detail: String },

    /// Sending on the main connection failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A request or upload envelope could not be encoded.
    #[error("encoding error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The connection closed while a request was outstanding.
    #[error("connection closed while awaiting response")]
    Disconnected,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Creates a malformed-response error.
    pub fn malformed(command: impl Into<String>, detail: impl ToString) -> Self {
        Self::Malformed {
            command: command.into(),
            detail: detail.to_string(),
        }
    }

    /// Creates a server failure error.
    pub fn failure(command: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Failure {
            command: command.into(),
            detail: detail.into(),
        }
    }

    /// Returns true if retrying the whole operation may succeed.
    ///
    /// A frame the transport could not encode fails the same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(TransportError::Protocol(_)) => false,
            Self::Timeout { .. }
            | Self::UploadFailed { .. }
            | Self::Transport(_)
            | Self::Disconnected => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ClientError::Timeout {
            command: "x".into(),
            attempts: 1
        }
        .is_retryable());
        assert!(ClientError::UploadFailed {
            reason: "reset".into()
        }
        .is_retryable());
        assert!(ClientError::Transport(TransportError::Closed).is_retryable());
        assert!(
            !ClientError::Transport(TransportError::Protocol(ProtocolError::EmptyMessage))
                .is_retryable()
        );
        assert!(!ClientError::PermissionDenied { group_code: 1 }.is_retryable());
        assert!(!ClientError::ContentTooLarge { size: 1 }.is_retryable());
        assert!(!ClientError::malformed("x", "bad").is_retryable());
    }

    #[test]
    fn display_messages() {
        let err = ClientError::RecallRejected {
            message_id: 42,
            detail: "Failure { result: 154 }".into(),
        };
        assert_eq!(err.to_string(), "failed to recall message #42: Failure { result: 154 }");

        let err = ClientError::Timeout {
            command: "MultiMsg.ApplyUp".into(),
            attempts: 3,
        };
        assert_eq!(err.to_string(), "timeout waiting for MultiMsg.ApplyUp after 3 attempt(s)");
    }
}
