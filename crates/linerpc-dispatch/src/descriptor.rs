//! Type descriptors: the normalized shape of a parameter or return type.
//!
//! Descriptors are what dispatch matches arguments against. The textual
//! form is used in logs, error messages and event signatures:
//!
//! ```text
//! any | text | integer | bool | list<T> | map<text,T> | <Name>
//! ```
//!
//! `Name` is an application type (an enum, usually) that travels as an
//! integer once registered with the [`Marshaler`](crate::Marshaler).

use std::fmt;
use std::str::FromStr;

use crate::MarshalError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    /// Accepts and produces any value unchanged.
    Any,
    Text,
    Integer,
    Bool,
    /// A list whose every element matches the inner descriptor.
    List(Box<TypeDescriptor>),
    /// A text-keyed map whose every value matches the inner descriptor.
    Map(Box<TypeDescriptor>),
    /// An application type resolved through the marshaler's registry.
    Named(String),
}

impl TypeDescriptor {
    pub fn list(inner: TypeDescriptor) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn map(inner: TypeDescriptor) -> Self {
        Self::Map(Box::new(inner))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Text => f.write_str("text"),
            Self::Integer => f.write_str("integer"),
            Self::Bool => f.write_str("bool"),
            Self::List(inner) => write!(f, "list<{inner}>"),
            Self::Map(inner) => write!(f, "map<text,{inner}>"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Parses the normalized form, plus the usual Rust spellings
/// (`String`, `i64`, `Vec<T>`, `HashMap<String, T>`, ...).
impl FromStr for TypeDescriptor {
    type Err = MarshalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        parse(&compact).ok_or_else(|| MarshalError::InvalidDescriptor(s.trim().to_string()))
    }
}

fn parse(s: &str) -> Option<TypeDescriptor> {
    if let Some((head, inner)) = generic(s) {
        return match head {
            "list" | "Vec" => parse(inner).map(TypeDescriptor::list),
            "map" | "BTreeMap" | "HashMap" => {
                let (key, value) = split_top_level_comma(inner)?;
                if parse(key)? != TypeDescriptor::Text {
                    return None;
                }
                parse(value).map(TypeDescriptor::map)
            }
            _ => None,
        };
    }

    let desc = match s {
        "any" | "Value" => TypeDescriptor::Any,
        "text" | "String" | "str" | "&str" => TypeDescriptor::Text,
        "integer" | "i64" | "i32" | "i16" | "i8" | "u32" | "u16" | "u8" | "int" => {
            TypeDescriptor::Integer
        }
        "bool" => TypeDescriptor::Bool,
        name if is_identifier(name) => TypeDescriptor::Named(name.to_string()),
        _ => return None,
    };
    Some(desc)
}

/// Splits `head<inner>` into its parts.
fn generic(s: &str) -> Option<(&str, &str)> {
    let open = s.find('<')?;
    let inner = s.strip_suffix('>')?;
    Some((&s[..open], &inner[open + 1..]))
}

fn split_top_level_comma(s: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => return Some((&s[..i], &s[i + 1..])),
            _ => {}
        }
    }
    None
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(s: &str) -> TypeDescriptor {
        s.parse().unwrap()
    }

    #[test]
    fn test_display_normalized_forms() {
        assert_eq!(TypeDescriptor::Any.to_string(), "any");
        assert_eq!(
            TypeDescriptor::list(TypeDescriptor::map(TypeDescriptor::Integer)).to_string(),
            "list<map<text,integer>>"
        );
        assert_eq!(TypeDescriptor::named("Color").to_string(), "Color");
    }

    #[test]
    fn test_from_str_normalized_round_trip() {
        for text in [
            "any",
            "text",
            "integer",
            "bool",
            "list<text>",
            "map<text,list<integer>>",
            "list<list<bool>>",
            "map<text,map<text,any>>",
        ] {
            assert_eq!(parse_ok(text).to_string(), text);
        }
    }

    #[test]
    fn test_from_str_accepts_rust_spellings() {
        assert_eq!(parse_ok("String"), TypeDescriptor::Text);
        assert_eq!(parse_ok("i32"), TypeDescriptor::Integer);
        assert_eq!(parse_ok("Vec<i64>"), TypeDescriptor::list(TypeDescriptor::Integer));
        assert_eq!(
            parse_ok("HashMap<String, Vec<String>>"),
            TypeDescriptor::map(TypeDescriptor::list(TypeDescriptor::Text))
        );
    }

    #[test]
    fn test_from_str_named_type() {
        assert_eq!(parse_ok("Color"), TypeDescriptor::named("Color"));
        assert_eq!(parse_ok("shapes::Kind"), TypeDescriptor::named("shapes::Kind"));
    }

    #[test]
    fn test_from_str_rejects_non_text_map_key() {
        assert!(matches!(
            "map<integer,text>".parse::<TypeDescriptor>(),
            Err(MarshalError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn test_from_str_rejects_garbage() {
        for text in ["", "list<", "list<text", "1abc", "list<>", "map<text>"] {
            assert!(text.parse::<TypeDescriptor>().is_err(), "{text}");
        }
    }
}
