//! Unified error type for linerpc.

use std::time::Duration;

use linerpc_dispatch::{DispatchError, MarshalError};
use linerpc_protocol::{ErrorCode, JsonError, ProtocolError};
use linerpc_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each layer's variant lets `?` convert
/// sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Connecting, accepting, reading or writing failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encoding a request or converting a result failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Registering a binding or running a command locally failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    /// A call was made before [`Rpc::set_peer`](crate::Rpc::set_peer).
    #[error("no peer connected")]
    NotConnected,

    /// The connection ended before the response arrived.
    #[error("connection closed")]
    ConnectionClosed,

    /// A blocking call from the thread that drives a current-thread
    /// runtime. Waiting there would starve the connection it waits on.
    #[error("blocking call would stall the current-thread runtime")]
    BlockingInRuntime,

    /// No response within the configured call timeout.
    #[error("call timed out after {0:?}")]
    CallTimeout(Duration),

    /// The peer answered with a non-zero error code.
    #[error("remote {code}: {message}")]
    Remote { code: ErrorCode, message: String },
}

impl From<JsonError> for RpcError {
    fn from(e: JsonError) -> Self {
        Self::Protocol(ProtocolError::Json(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: RpcError = TransportError::Shutdown.into();
        assert!(matches!(err, RpcError::Transport(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_json_error_wraps_protocol() {
        let err: RpcError = JsonError::UnknownType("Color".into()).into();
        assert!(matches!(err, RpcError::Protocol(ProtocolError::Json(_))));
    }

    #[test]
    fn test_from_dispatch_error() {
        let err: RpcError = DispatchError::CommandNotFound("g".into()).into();
        assert_eq!(err.to_string(), "no such command: g");
    }

    #[test]
    fn test_remote_error_display() {
        let err = RpcError::Remote {
            code: ErrorCode::SystemError,
            message: "no such command: g".into(),
        };
        assert_eq!(err.to_string(), "remote system error: no such command: g");
    }
}
