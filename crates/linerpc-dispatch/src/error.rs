//! Error types for the dispatch layer.

use linerpc_protocol::ValueKind;

/// Errors converting between [`Value`](linerpc_protocol::Value) and
/// native types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarshalError {
    /// The value's variant doesn't fit the descriptor. No coercion is
    /// attempted: `"5"` is not an integer.
    #[error("expected {expected}, found {found}")]
    Mismatch { expected: String, found: ValueKind },

    /// A named type that the marshaler was not told how to carry.
    #[error("type `{0}` is not registered for marshaling")]
    UnregisteredType(String),

    /// An integer that doesn't fit the native parameter type.
    #[error("value {value} out of range for {target}")]
    OutOfRange { target: &'static str, value: i64 },

    /// Wrong number of arguments for a method.
    #[error("expected {expected} arguments, found {found}")]
    Arity { expected: usize, found: usize },

    /// A textual descriptor that could not be parsed.
    #[error("invalid type descriptor `{0}`")]
    InvalidDescriptor(String),
}

/// Errors resolving or running a command, or binding an event.
///
/// The `Display` text of the command variants is what the remote caller
/// sees in a system-error response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// No binding, or no method with the bound name.
    #[error("no such command: {0}")]
    CommandNotFound(String),

    /// No candidate with matching arity and types, or more than one.
    #[error("signature mismatch for command {0}")]
    SignatureMismatch(String),

    /// The object doesn't declare the event being subscribed.
    #[error("{object} has no event `{event}`")]
    EventNotFound { object: String, event: String },

    #[error("marshaling failed: {0}")]
    Marshal(#[from] MarshalError),

    /// The method panicked while running.
    #[error("command {0} panicked")]
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_errors_render_remote_text() {
        assert_eq!(
            DispatchError::CommandNotFound("g".into()).to_string(),
            "no such command: g"
        );
        assert_eq!(
            DispatchError::SignatureMismatch("f".into()).to_string(),
            "signature mismatch for command f"
        );
    }

    #[test]
    fn test_from_marshal_error() {
        let err: DispatchError = MarshalError::UnregisteredType("Color".into()).into();
        assert!(matches!(err, DispatchError::Marshal(_)));
        assert!(err.to_string().contains("Color"));
    }
}
