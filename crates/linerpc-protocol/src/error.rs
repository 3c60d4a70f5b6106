//! Error types for the protocol layer.
//!
//! Two families live here. [`JsonError`] is what the value codec reports;
//! decode variants carry the byte offset where parsing stopped.
//! [`FrameError`] is what the line-level framing reports. [`ProtocolError`]
//! wraps both for callers that don't care which stage failed.

/// Errors produced by the JSON value codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JsonError {
    /// The input ended in the middle of a value.
    #[error("unexpected end of JSON input at position {0}")]
    UnexpectedEnd(usize),

    /// A character that cannot start or continue the current token.
    #[error("unexpected character at position {0}")]
    UnexpectedCharacter(usize),

    /// An object key was not followed by `:`.
    #[error("unexpected character, expected colon at position {0}")]
    ExpectedColon(usize),

    /// A run of number characters that is not a valid number.
    #[error("can't parse number at position {0}")]
    IllegalNumber(usize),

    /// A bare word other than `true`, `false` or `null`.
    #[error(
        "can't parse keyword at position {0}; only `true`, `false` and `null` are supported"
    )]
    UnknownKeyword(usize),

    /// Encoding met a value with no JSON representation.
    #[error("found unknown type `{0}` when trying to encode JSON")]
    UnknownType(String),
}

impl JsonError {
    /// Byte offset of a decode error. `None` for encode errors.
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::UnexpectedEnd(p)
            | Self::UnexpectedCharacter(p)
            | Self::ExpectedColon(p)
            | Self::IllegalNumber(p)
            | Self::UnknownKeyword(p) => Some(*p),
            Self::UnknownType(_) => None,
        }
    }
}

/// Errors produced while splitting and classifying wire lines.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// A command line without arguments, with undecodable arguments, or
    /// whose arguments are not a list.
    #[error("error parsing command: {line}")]
    MalformedCommand { line: String },

    /// A response line without a space after the code.
    #[error("malformed response: {line}")]
    MalformedResponse { line: String },

    /// A line grew past the configured limit without a terminator.
    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}

/// Any protocol-layer failure.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Json(#[from] JsonError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Conversion between [`Value`](crate::Value) and a serde type failed.
    #[cfg(feature = "serde")]
    #[error("serde conversion failed: {0}")]
    Serde(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_reports_offset_for_decode_errors() {
        assert_eq!(JsonError::IllegalNumber(3).position(), Some(3));
        assert_eq!(JsonError::UnknownType("Color".into()).position(), None);
    }

    #[test]
    fn test_malformed_command_display_includes_line() {
        let err = FrameError::MalformedCommand {
            line: "add".into(),
        };
        assert_eq!(err.to_string(), "error parsing command: add");
    }

    #[test]
    fn test_protocol_error_from_json_error_is_transparent() {
        let err: ProtocolError = JsonError::ExpectedColon(5).into();
        assert!(matches!(err, ProtocolError::Json(_)));
        assert!(err.to_string().contains("expected colon at position 5"));
    }
}
