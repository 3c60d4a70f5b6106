//! Wire frames: one message per `\n`-terminated line.
//!
//! ```text
//! command:   [async ]<name> <json array of arguments>
//! response:  <integer error code> <json value>
//! ```
//!
//! A line whose first byte is an ASCII digit is a response; anything else
//! is a command. Commands and responses travel on the same stream in both
//! directions, so each side parses both kinds.

use std::fmt;

use crate::json::{self, DecodeOptions, EncodeOptions};
use crate::{FrameError, JsonError, Value};

/// Prefix marking a fire-and-forget command.
const ASYNC_PREFIX: &str = "async ";

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

/// Status carried at the start of every response line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The value is the call's return value.
    NoError,
    /// The call failed on the remote side; the value is a message.
    SystemError,
    /// The command line could not be parsed; the value is a message.
    ParseError,
    /// A code this side doesn't know. Kept so it can be reported.
    Other(i64),
}

impl ErrorCode {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::NoError => 0,
            Self::SystemError => 1,
            Self::ParseError => 2,
            Self::Other(n) => n,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::NoError
    }
}

impl From<i64> for ErrorCode {
    fn from(n: i64) -> Self {
        match n {
            0 => Self::NoError,
            1 => Self::SystemError,
            2 => Self::ParseError,
            n => Self::Other(n),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoError => f.write_str("no error"),
            Self::SystemError => f.write_str("system error"),
            Self::ParseError => f.write_str("parse error"),
            Self::Other(n) => write!(f, "error code {n}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// A request to run `name` with `args` on the peer.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandFrame {
    pub name: String,
    pub args: Vec<Value>,
    /// Fire-and-forget: the peer runs it without replying.
    pub async_call: bool,
}

impl CommandFrame {
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
            async_call: false,
        }
    }

    pub fn new_async(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            async_call: true,
            ..Self::new(name, args)
        }
    }

    /// Renders the frame as a complete line, including the newline.
    ///
    /// # Errors
    /// Fails with [`JsonError::UnknownType`] if an argument has no JSON
    /// form. Arguments are never silently replaced by `null`.
    pub fn encode(&self) -> Result<String, JsonError> {
        let args = Value::List(self.args.clone());
        let json = json::encode(&args, &EncodeOptions::compact())?;
        let prefix = if self.async_call { ASYNC_PREFIX } else { "" };
        Ok(format!("{prefix}{} {json}\n", self.name))
    }
}

/// The reply to a synchronous command.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFrame {
    pub code: ErrorCode,
    pub value: Value,
}

impl ResponseFrame {
    pub fn ok(value: Value) -> Self {
        Self {
            code: ErrorCode::NoError,
            value,
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            value: Value::Text(message.into()),
        }
    }

    /// Renders the frame as a complete line, including the newline.
    ///
    /// Values without a JSON form are written as `null`, so a reply can
    /// always be produced.
    pub fn encode(&self) -> String {
        let options = EncodeOptions::compact().with_unknown_as_null(true);
        // With unknown_as_null set, encoding has no failure mode left.
        let json = json::encode(&self.value, &options).unwrap_or_else(|_| "null".to_string());
        format!("{} {json}\n", self.code.as_i64())
    }
}

/// A parsed wire line.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Command(CommandFrame),
    Response(ResponseFrame),
}

impl Frame {
    /// Parses one line, without its terminator.
    ///
    /// Returns `Ok(None)` for a blank line. A trailing `\r` is tolerated.
    ///
    /// # Errors
    /// - [`FrameError::MalformedCommand`]: no space after the name, the
    ///   arguments don't decode, or they decode to something other than a
    ///   list. The peer expects a parse-error reply for these.
    /// - [`FrameError::MalformedResponse`]: no space after the code. These
    ///   are dropped.
    ///
    /// A response is otherwise always returned, so the caller waiting on
    /// it is released: a code that is not an integer reads as `0`, and a
    /// value that fails to decode reads as `Null`.
    pub fn parse(line: &str, options: &DecodeOptions) -> Result<Option<Self>, FrameError> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            return Ok(None);
        }
        if line.as_bytes()[0].is_ascii_digit() {
            parse_response(line, options).map(|r| Some(Frame::Response(r)))
        } else {
            parse_command(line, options).map(|c| Some(Frame::Command(c)))
        }
    }
}

fn parse_command(line: &str, options: &DecodeOptions) -> Result<CommandFrame, FrameError> {
    let malformed = || FrameError::MalformedCommand {
        line: line.to_string(),
    };

    let (async_call, rest) = match line.strip_prefix(ASYNC_PREFIX) {
        Some(rest) => (true, rest),
        None => (false, line),
    };
    let (name, args) = rest.trim_start().split_once(' ').ok_or_else(malformed)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(malformed());
    }

    match json::decode(args.trim(), options) {
        Ok(Value::List(args)) => Ok(CommandFrame {
            name: name.to_string(),
            args,
            async_call,
        }),
        Ok(other) => {
            tracing::debug!(command = name, kind = %other.kind(), "arguments are not a list");
            Err(malformed())
        }
        Err(e) => {
            tracing::debug!(command = name, error = %e, "failed to decode arguments");
            Err(malformed())
        }
    }
}

fn parse_response(line: &str, options: &DecodeOptions) -> Result<ResponseFrame, FrameError> {
    let malformed = || FrameError::MalformedResponse {
        line: line.to_string(),
    };

    let (code, value) = line.split_once(' ').ok_or_else(malformed)?;
    let code = code.parse::<i64>().unwrap_or_else(|_| {
        tracing::warn!(code, "response code is not an integer, read as 0");
        0
    });

    let value = json::decode(value.trim(), options).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to decode response value");
        Value::Null
    });

    Ok(ResponseFrame {
        code: ErrorCode::from(code),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Option<Frame>, FrameError> {
        Frame::parse(line, &DecodeOptions::default())
    }

    #[test]
    fn test_command_encode_sync() {
        let frame = CommandFrame::new("add", vec![Value::Integer(2), Value::Integer(3)]);
        assert_eq!(frame.encode().unwrap(), "add [2,3]\n");
    }

    #[test]
    fn test_command_encode_async_has_prefix() {
        let frame =
            CommandFrame::new_async("notify", vec![Value::Integer(42), Value::from("hi")]);
        assert_eq!(frame.encode().unwrap(), "async notify [42,\"hi\"]\n");
    }

    #[test]
    fn test_command_encode_opaque_argument_fails() {
        let frame = CommandFrame::new("paint", vec![Value::opaque("Color", 1)]);
        assert!(matches!(frame.encode(), Err(JsonError::UnknownType(_))));
    }

    #[test]
    fn test_response_encode_writes_numeric_code() {
        assert_eq!(ResponseFrame::ok(Value::Integer(5)).encode(), "0 5\n");
        assert_eq!(
            ResponseFrame::error(ErrorCode::SystemError, "no such command: g").encode(),
            "1 \"no such command: g\"\n"
        );
    }

    #[test]
    fn test_response_encode_opaque_value_becomes_null() {
        let frame = ResponseFrame::ok(Value::opaque("Color", 1));
        assert_eq!(frame.encode(), "0 null\n");
    }

    #[test]
    fn test_parse_blank_line_is_none() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("   ").unwrap(), None);
        assert_eq!(parse("\r").unwrap(), None);
    }

    #[test]
    fn test_parse_command_sync_and_async() {
        let frame = parse("add [2,3]").unwrap().unwrap();
        assert_eq!(
            frame,
            Frame::Command(CommandFrame::new(
                "add",
                vec![Value::Integer(2), Value::Integer(3)]
            ))
        );

        let frame = parse("async notify [\"x\"]\r").unwrap().unwrap();
        assert_eq!(
            frame,
            Frame::Command(CommandFrame::new_async("notify", vec![Value::from("x")]))
        );
    }

    #[test]
    fn test_parse_command_trims_name_and_arguments() {
        let frame = parse("  ping    []  ").unwrap().unwrap();
        assert_eq!(frame, Frame::Command(CommandFrame::new("ping", vec![])));
    }

    #[test]
    fn test_parse_command_without_space_is_malformed() {
        assert_eq!(
            parse("ping").unwrap_err(),
            FrameError::MalformedCommand {
                line: "ping".into()
            }
        );
    }

    #[test]
    fn test_parse_command_with_non_list_arguments_is_malformed() {
        assert!(matches!(
            parse("add {\"a\":1}"),
            Err(FrameError::MalformedCommand { .. })
        ));
        assert!(matches!(parse("add 5"), Err(FrameError::MalformedCommand { .. })));
    }

    #[test]
    fn test_parse_command_with_bad_json_is_malformed() {
        assert!(matches!(
            parse("add [1,]"),
            Err(FrameError::MalformedCommand { .. })
        ));
    }

    #[test]
    fn test_parse_command_with_lenient_options_accepts_bare_words() {
        let frame = Frame::parse("greet [alice bob]", &DecodeOptions::lenient())
            .unwrap()
            .unwrap();
        assert_eq!(
            frame,
            Frame::Command(CommandFrame::new("greet", vec![Value::from("alice bob")]))
        );
    }

    #[test]
    fn test_parse_response() {
        let frame = parse("0 5").unwrap().unwrap();
        assert_eq!(frame, Frame::Response(ResponseFrame::ok(Value::Integer(5))));

        let frame = parse("1 \"signature mismatch for command f\"").unwrap().unwrap();
        assert_eq!(
            frame,
            Frame::Response(ResponseFrame::error(
                ErrorCode::SystemError,
                "signature mismatch for command f"
            ))
        );
    }

    #[test]
    fn test_parse_response_without_space_is_malformed() {
        assert!(matches!(parse("0"), Err(FrameError::MalformedResponse { .. })));
    }

    #[test]
    fn test_parse_response_with_non_integer_code_reads_as_zero() {
        let frame = parse("0x 1").unwrap().unwrap();
        assert_eq!(frame, Frame::Response(ResponseFrame::ok(Value::Integer(1))));

        let frame = parse("9999999999999999999999 \"big\"").unwrap().unwrap();
        assert_eq!(frame, Frame::Response(ResponseFrame::ok(Value::from("big"))));
    }

    #[test]
    fn test_parse_response_with_bad_value_delivers_null() {
        let frame = parse("0 [1,").unwrap().unwrap();
        assert_eq!(frame, Frame::Response(ResponseFrame::ok(Value::Null)));
    }

    #[test]
    fn test_parse_response_keeps_unknown_code() {
        let frame = parse("7 null").unwrap().unwrap();
        let Frame::Response(response) = frame else {
            panic!("expected a response");
        };
        assert_eq!(response.code, ErrorCode::Other(7));
        assert!(!response.code.is_ok());
    }
}
