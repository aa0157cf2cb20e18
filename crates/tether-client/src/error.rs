//! Client error types.

use tether_proto::{ProtoError, RemoteError};
use thiserror::Error;

/// Errors from remote target operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The transport failed. The session cannot continue.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A frame decoded but its contents did not.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtoError),

    /// The remote answered with an error reply.
    #[error("{op} failed: {source}")]
    Remote {
        /// Request that failed.
        op: &'static str,
        /// The error reply.
        source: RemoteError,
    },

    /// The remote answered with a reply shape the request does not allow.
    #[error("unexpected reply to {op}: {reply}")]
    UnexpectedReply {
        /// Request that was answered.
        op: &'static str,
        /// Short description of what arrived.
        reply: String,
    },

    /// No execution context has been selected.
    #[error("no thread selected")]
    NoContext,

    /// No process is loaded or attached.
    #[error("no process")]
    NoProcess,

    /// The negotiated protocol revision lacks a feature.
    #[error("{feature} requires protocol {required}, remote speaks {actual}")]
    Unsupported {
        /// Feature name.
        feature: &'static str,
        /// Minimum revision.
        required: String,
        /// Negotiated revision.
        actual: String,
    },

    /// The CPU reported by the remote has no register layout here.
    #[error("no register layout for cpu {0}")]
    UnknownArchitecture(i32),

    /// A register name was not found in the active layout.
    #[error("unknown register: {0}")]
    UnknownRegister(String),

    /// A register value of the wrong size was supplied.
    #[error("register {name} is {expected} bytes, got {got}")]
    RegisterWidth {
        /// Register name.
        name: &'static str,
        /// Register size.
        expected: usize,
        /// Bytes supplied.
        got: usize,
    },

    /// The remote returned fewer bytes than the transfer needs.
    #[error("short transfer: expected {expected} bytes, got {got}")]
    ShortTransfer {
        /// Bytes requested.
        expected: usize,
        /// Bytes received.
        got: usize,
    },

    /// The user gave up waiting for the target to stop.
    #[error("remote process abandoned after interrupt timed out")]
    Abandoned,

    /// The session has already been closed.
    #[error("session closed")]
    Closed,
}

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tether_proto::RemoteErrorCode;

    #[test]
    fn error_transport_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let err = ClientError::from(io_err);
        assert_eq!(err.to_string(), "transport error: pipe broken");
    }

    #[test]
    fn error_protocol_display() {
        let err = ClientError::from(ProtoError::UnknownCommand(99));
        assert!(err.to_string().starts_with("protocol error:"));
    }

    #[test]
    fn error_remote_display() {
        let err = ClientError::Remote {
            op: "attach",
            source: RemoteError {
                code: RemoteErrorCode::Procfs,
                errno: 2,
                local: false,
            },
        };
        let msg = err.to_string();
        assert!(msg.starts_with("attach failed: remote procfs error"), "got: {msg}");
    }

    #[test]
    fn error_unsupported_display() {
        let err = ClientError::Unsupported {
            feature: "thread names",
            required: "0.3".into(),
            actual: "0.2".into(),
        };
        assert_eq!(
            err.to_string(),
            "thread names requires protocol 0.3, remote speaks 0.2"
        );
    }

    #[test]
    fn error_short_transfer_display() {
        let err = ClientError::ShortTransfer {
            expected: 512,
            got: 108,
        };
        assert_eq!(err.to_string(), "short transfer: expected 512 bytes, got 108");
    }

    #[test]
    fn error_simple_variants_display() {
        assert_eq!(ClientError::NoContext.to_string(), "no thread selected");
        assert_eq!(ClientError::NoProcess.to_string(), "no process");
        assert_eq!(ClientError::Closed.to_string(), "session closed");
        assert_eq!(
            ClientError::UnknownRegister("xyz".into()).to_string(),
            "unknown register: xyz"
        );
    }
}
