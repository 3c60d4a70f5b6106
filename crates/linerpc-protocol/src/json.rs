//! JSON text codec for [`Value`].
//!
//! The encoder always writes standard JSON. The decoder is a
//! recursive-descent parser with one character of lookahead and three
//! independent leniency switches (see [`DecodeOptions`]).
//!
//! Positions in decode errors are byte offsets into the input.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use crate::{JsonError, Value};

/// Containers nested deeper than this are rejected instead of recursing.
const MAX_DEPTH: usize = 512;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Omit all newlines and indentation.
    pub compact: bool,
    /// Write values without a JSON form as `null` instead of failing.
    pub unknown_as_null: bool,
    /// Spaces per nesting level when not compact.
    pub indent: usize,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            compact: false,
            unknown_as_null: false,
            indent: 4,
        }
    }
}

impl EncodeOptions {
    /// Single-line output, as used on the wire.
    pub fn compact() -> Self {
        Self {
            compact: true,
            ..Self::default()
        }
    }

    pub fn with_unknown_as_null(mut self, enabled: bool) -> Self {
        self.unknown_as_null = enabled;
        self
    }

    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }
}

/// Decoder settings. All switches are off by default (strict JSON).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Decode objects as [`Value::HashObject`] instead of [`Value::Object`].
    pub hash_objects: bool,
    /// Accept bare words as text. They end at `:`, `,`, `]`, `}`, a
    /// newline or the end of input and are trimmed; `true`, `false` and
    /// `null` still decode to their typed values.
    pub allow_unquoted_strings: bool,
    /// Accept whitespace in place of a comma between entries. At least
    /// one whitespace character must separate the entries.
    pub allow_missing_comma: bool,
}

impl DecodeOptions {
    /// Both token-level leniency rules on, ordered objects.
    pub fn lenient() -> Self {
        Self {
            hash_objects: false,
            allow_unquoted_strings: true,
            allow_missing_comma: true,
        }
    }

    pub fn with_hash_objects(mut self, enabled: bool) -> Self {
        self.hash_objects = enabled;
        self
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Encodes `value` as JSON text.
///
/// # Errors
/// Returns [`JsonError::UnknownType`] when the tree contains a
/// [`Value::Opaque`] and `unknown_as_null` is off.
pub fn encode(value: &Value, options: &EncodeOptions) -> Result<String, JsonError> {
    let mut encoder = Encoder {
        out: String::new(),
        options,
    };
    encoder.value(value, 0)?;
    Ok(encoder.out)
}

struct Encoder<'a> {
    out: String,
    options: &'a EncodeOptions,
}

impl Encoder<'_> {
    fn value(&mut self, value: &Value, depth: usize) -> Result<(), JsonError> {
        match value {
            Value::Null => self.out.push_str("null"),
            Value::Bool(b) => self.out.push_str(if *b { "true" } else { "false" }),
            Value::Integer(n) => {
                let _ = write!(self.out, "{n}");
            }
            Value::Double(d) => self.out.push_str(&format_double(*d)),
            Value::Text(s) => write_string(&mut self.out, s),
            Value::Bytes(b) => write_string(&mut self.out, &String::from_utf8_lossy(b)),
            Value::List(items) => {
                if items.is_empty() {
                    self.out.push_str("[]");
                    return Ok(());
                }
                self.out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.out.push(',');
                    }
                    self.newline(depth + 1);
                    self.value(item, depth + 1)?;
                }
                self.newline(depth);
                self.out.push(']');
            }
            Value::Object(map) => self.object(map.iter(), map.is_empty(), depth)?,
            Value::HashObject(map) => self.object(map.iter(), map.is_empty(), depth)?,
            Value::Opaque { type_name, .. } => {
                if !self.options.unknown_as_null {
                    return Err(JsonError::UnknownType(type_name.clone()));
                }
                self.out.push_str("null");
            }
        }
        Ok(())
    }

    fn object<'v>(
        &mut self,
        entries: impl Iterator<Item = (&'v String, &'v Value)>,
        empty: bool,
        depth: usize,
    ) -> Result<(), JsonError> {
        if empty {
            self.out.push_str("{}");
            return Ok(());
        }
        self.out.push('{');
        for (i, (key, value)) in entries.enumerate() {
            if i > 0 {
                self.out.push(',');
            }
            self.newline(depth + 1);
            write_string(&mut self.out, key);
            self.out
                .push_str(if self.options.compact { ":" } else { " : " });
            self.value(value, depth + 1)?;
        }
        self.newline(depth);
        self.out.push('}');
        Ok(())
    }

    fn newline(&mut self, depth: usize) {
        if self.options.compact {
            return;
        }
        self.out.push('\n');
        for _ in 0..depth * self.options.indent {
            self.out.push(' ');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '/' => out.push_str("\\/"),
            '\u{8}' => out.push_str("\\b"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\u{c}' => out.push_str("\\f"),
            '\r' => out.push_str("\\r"),
            ' '..='~' => out.push(c),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{unit:04x}");
                }
            }
        }
    }
    out.push('"');
}

/// Formats a double with 16 significant digits, `%.16g` style, and
/// guarantees a `.` or exponent in the result. Non-finite values have no
/// JSON form and become `null`.
fn format_double(d: f64) -> String {
    if !d.is_finite() {
        return "null".to_string();
    }

    let sci = format!("{d:.15e}");
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    let mut s = if (-4..16).contains(&exp) {
        let precision = (15 - exp) as usize;
        strip_fraction_zeros(&format!("{d:.precision$}")).to_string()
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", strip_fraction_zeros(mantissa), exp.abs())
    };

    if !s.contains(['.', 'e']) {
        s.push_str(".0");
    }
    s
}

fn strip_fraction_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Decodes one JSON value from `text`.
///
/// Empty input decodes to [`Value::Null`]. Anything after the first
/// complete value is ignored.
pub fn decode(text: &str, options: &DecodeOptions) -> Result<Value, JsonError> {
    if text.is_empty() {
        return Ok(Value::Null);
    }
    let mut parser = Parser {
        src: text,
        bytes: text.as_bytes(),
        pos: 0,
        depth: 0,
        options,
    };
    parser.value()
}

/// Like [`decode`], treating absent input the same as empty input.
pub fn decode_optional(
    text: Option<&str>,
    options: &DecodeOptions,
) -> Result<Value, JsonError> {
    match text {
        Some(text) => decode(text, options),
        None => Ok(Value::Null),
    }
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
    options: &'a DecodeOptions,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Returns the next byte or fails with `UnexpectedEnd`.
    fn require(&self) -> Result<u8, JsonError> {
        self.peek().ok_or(JsonError::UnexpectedEnd(self.bytes.len()))
    }

    /// Skips JSON whitespace and returns how many bytes were skipped.
    fn skip_whitespace(&mut self) -> usize {
        let start = self.pos;
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
        self.pos - start
    }

    fn value(&mut self) -> Result<Value, JsonError> {
        self.skip_whitespace();
        let unquoted = self.options.allow_unquoted_strings;
        match self.require()? {
            b'"' => self.string().map(Value::Text),
            b'{' => self.nested(Self::object),
            b'[' => self.nested(Self::array),
            b't' | b'f' | b'n' if !unquoted => self.keyword(),
            b'0'..=b'9' | b'-' => self.number(),
            _ if unquoted => self.unquoted(),
            _ => Err(JsonError::UnexpectedCharacter(self.pos)),
        }
    }

    fn nested(
        &mut self,
        parse: fn(&mut Self) -> Result<Value, JsonError>,
    ) -> Result<Value, JsonError> {
        if self.depth >= MAX_DEPTH {
            return Err(JsonError::UnexpectedCharacter(self.pos));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// After an entry: consumes a separator, or leaves the closing
    /// bracket for the caller. Returns `true` if a comma was consumed.
    fn separator(&mut self, close: u8) -> Result<bool, JsonError> {
        let skipped = self.skip_whitespace();
        match self.require()? {
            b',' => {
                self.pos += 1;
                self.skip_whitespace();
                Ok(true)
            }
            c if c == close => Ok(false),
            _ if self.options.allow_missing_comma && skipped > 0 => Ok(false),
            _ => Err(JsonError::UnexpectedCharacter(self.pos)),
        }
    }

    fn array(&mut self) -> Result<Value, JsonError> {
        self.pos += 1; // '['
        self.skip_whitespace();
        let mut items = Vec::new();
        let mut after_comma = false;
        loop {
            if self.require()? == b']' {
                if after_comma {
                    return Err(JsonError::UnexpectedCharacter(self.pos));
                }
                self.pos += 1;
                return Ok(Value::List(items));
            }
            items.push(self.value()?);
            after_comma = self.separator(b']')?;
        }
    }

    fn object(&mut self) -> Result<Value, JsonError> {
        self.pos += 1; // '{'
        self.skip_whitespace();
        let mut entries = Vec::new();
        let mut after_comma = false;
        loop {
            if self.require()? == b'}' {
                if after_comma {
                    return Err(JsonError::UnexpectedCharacter(self.pos));
                }
                self.pos += 1;
                return Ok(self.build_object(entries));
            }

            self.skip_whitespace();
            let key_pos = self.pos;
            let key = key_text(self.value()?).ok_or(JsonError::UnexpectedCharacter(key_pos))?;

            self.skip_whitespace();
            if self.require()? != b':' {
                return Err(JsonError::ExpectedColon(self.pos));
            }
            self.pos += 1;

            let value = self.value()?;
            entries.push((key, value));
            after_comma = self.separator(b'}')?;
        }
    }

    fn build_object(&self, entries: Vec<(String, Value)>) -> Value {
        if self.options.hash_objects {
            Value::HashObject(entries.into_iter().collect::<HashMap<_, _>>())
        } else {
            Value::Object(entries.into_iter().collect::<BTreeMap<_, _>>())
        }
    }

    fn string(&mut self) -> Result<String, JsonError> {
        self.pos += 1; // opening quote
        let mut out = String::new();
        loop {
            match self.require()? {
                b'"' => {
                    self.pos += 1;
                    return Ok(out);
                }
                b'\\' => self.escape(&mut out)?,
                _ => self.plain_run(&mut out, |b| b == b'"' || b == b'\\'),
            }
        }
    }

    fn unquoted(&mut self) -> Result<Value, JsonError> {
        let start = self.pos;
        let mut out = String::new();
        while let Some(b) = self.peek() {
            match b {
                b':' | b',' | b']' | b'}' | b'\n' => break,
                b'\\' => self.escape(&mut out)?,
                _ => self.plain_run(&mut out, |b| {
                    matches!(b, b':' | b',' | b']' | b'}' | b'\n' | b'\\')
                }),
            }
        }
        if self.pos == start {
            return Err(JsonError::UnexpectedCharacter(start));
        }
        Ok(match out.trim() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "null" => Value::Null,
            word => Value::Text(word.to_string()),
        })
    }

    /// Copies bytes up to the next stop byte. Stop bytes are ASCII, so
    /// the slice always ends on a character boundary.
    fn plain_run(&mut self, out: &mut String, stop: impl Fn(u8) -> bool) {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if stop(b) {
                break;
            }
            self.pos += 1;
        }
        out.push_str(&self.src[start..self.pos]);
    }

    /// Decodes one escape sequence starting at the backslash.
    fn escape(&mut self, out: &mut String) -> Result<(), JsonError> {
        self.pos += 1; // '\'
        self.require()?;
        let Some(c) = self.src[self.pos..].chars().next() else {
            return Err(JsonError::UnexpectedEnd(self.bytes.len()));
        };
        self.pos += c.len_utf8();
        match c {
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'u' => {
                let unit = self.hex4()?;
                out.push(self.code_point(unit)?);
            }
            other => out.push(other),
        }
        Ok(())
    }

    fn hex4(&mut self) -> Result<u16, JsonError> {
        if self.pos + 4 > self.bytes.len() {
            return Err(JsonError::UnexpectedEnd(self.bytes.len()));
        }
        let digits = &self.bytes[self.pos..self.pos + 4];
        if !digits.iter().all(u8::is_ascii_hexdigit) {
            return Err(JsonError::UnexpectedCharacter(self.pos));
        }
        // All four bytes are ASCII hex digits, so this slice is valid.
        let unit = u16::from_str_radix(&self.src[self.pos..self.pos + 4], 16)
            .map_err(|_| JsonError::UnexpectedCharacter(self.pos))?;
        self.pos += 4;
        Ok(unit)
    }

    /// Resolves a `\u` unit, pairing a high surrogate with an immediately
    /// following `\u` low surrogate. Unpaired surrogates decode to U+FFFD.
    fn code_point(&mut self, unit: u16) -> Result<char, JsonError> {
        if !(0xD800..0xDC00).contains(&unit) {
            return Ok(char::from_u32(u32::from(unit)).unwrap_or(char::REPLACEMENT_CHARACTER));
        }
        if self.bytes.get(self.pos..self.pos + 2) != Some(b"\\u".as_slice()) {
            return Ok(char::REPLACEMENT_CHARACTER);
        }
        let save = self.pos;
        self.pos += 2;
        let low = self.hex4()?;
        if !(0xDC00..0xE000).contains(&low) {
            self.pos = save;
            return Ok(char::REPLACEMENT_CHARACTER);
        }
        let combined = 0x10000 + ((u32::from(unit) - 0xD800) << 10) + (u32::from(low) - 0xDC00);
        Ok(char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    fn keyword(&mut self) -> Result<Value, JsonError> {
        let rest = &self.bytes[self.pos..];
        let (value, len) = if rest.starts_with(b"true") {
            (Value::Bool(true), 4)
        } else if rest.starts_with(b"false") {
            (Value::Bool(false), 5)
        } else if rest.starts_with(b"null") {
            (Value::Null, 4)
        } else {
            return Err(JsonError::UnknownKeyword(self.pos));
        };
        self.pos += len;
        Ok(value)
    }

    fn number(&mut self) -> Result<Value, JsonError> {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(b'0'..=b'9' | b'.' | b'e' | b'E' | b'+' | b'-')
        ) {
            self.pos += 1;
        }
        let run = &self.src[start..self.pos];
        let parsed = if run.contains(['.', 'e', 'E']) {
            run.parse::<f64>().ok().map(Value::Double)
        } else {
            run.parse::<i64>().ok().map(Value::Integer)
        };
        parsed.ok_or(JsonError::IllegalNumber(self.pos))
    }
}

/// Object keys are text; scalar keys are converted, containers rejected.
fn key_text(key: Value) -> Option<String> {
    match key {
        Value::Text(s) => Some(s),
        Value::Integer(n) => Some(n.to_string()),
        Value::Double(d) => Some(format_double(d)),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}
