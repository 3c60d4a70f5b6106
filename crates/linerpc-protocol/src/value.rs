//! The dynamic value model every payload is expressed in.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A JSON-compatible tagged value.
///
/// `Object` iterates its keys in ascending order. `HashObject` holds the
/// same data with unspecified iteration order; the decoder produces it
/// when [`DecodeOptions::hash_objects`](crate::DecodeOptions) is set.
/// Both compare equal when their entries do.
///
/// `Opaque` stands for a native value with no registered conversion
/// (an enum, typically). It has no JSON form: encoding one fails with
/// [`JsonError::UnknownType`](crate::JsonError::UnknownType) unless the
/// encoder is told to write such values as `null`.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
    HashObject(HashMap<String, Value>),
    Opaque { type_name: String, ordinal: i64 },
}

/// The variant of a [`Value`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Integer,
    Double,
    Text,
    Bytes,
    List,
    Object,
    Opaque,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Double => "double",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::List => "list",
            Self::Object => "object",
            Self::Opaque => "opaque",
        };
        f.write_str(name)
    }
}

impl Value {
    /// Builds an opaque value of a named native type.
    pub fn opaque(type_name: impl Into<String>, ordinal: i64) -> Self {
        Self::Opaque {
            type_name: type_name.into(),
            ordinal,
        }
    }

    /// Returns the variant tag. Both object variants report `Object`.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Integer(_) => ValueKind::Integer,
            Self::Double(_) => ValueKind::Double,
            Self::Text(_) => ValueKind::Text,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::List(_) => ValueKind::List,
            Self::Object(_) | Self::HashObject(_) => ValueKind::Object,
            Self::Opaque { .. } => ValueKind::Opaque,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value as a double. Integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            Self::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Looks up `key` in either object variant.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Object(map) => map.get(key),
            Self::HashObject(map) => map.get(key),
            _ => None,
        }
    }

    /// Iterates the entries of either object variant.
    ///
    /// Returns `None` for non-objects. `Object` entries come out in key
    /// order; `HashObject` entries in no particular order.
    pub fn entries(&self) -> Option<Box<dyn Iterator<Item = (&String, &Value)> + '_>> {
        match self {
            Self::Object(map) => Some(Box::new(map.iter())),
            Self::HashObject(map) => Some(Box::new(map.iter())),
            _ => None,
        }
    }

    /// Number of entries of either object variant, `None` otherwise.
    pub fn object_len(&self) -> Option<usize> {
        match self {
            Self::Object(map) => Some(map.len()),
            Self::HashObject(map) => Some(map.len()),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Double(a), Double(b)) => a == b,
            (Text(a), Text(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Object(a), Object(b)) => a == b,
            (HashObject(a), HashObject(b)) => a == b,
            (Object(a), HashObject(b)) | (HashObject(b), Object(a)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (
                Opaque {
                    type_name: ta,
                    ordinal: oa,
                },
                Opaque {
                    type_name: tb,
                    ordinal: ob,
                },
            ) => ta == tb && oa == ob,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

macro_rules! from_integer {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Self::Integer(i64::from(n))
            }
        })*
    };
}

from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Self::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<BTreeMap<String, T>> for Value {
    fn from(map: BTreeMap<String, T>) -> Self {
        Self::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Value>> From<HashMap<String, T>> for Value {
    fn from(map: HashMap<String, T>) -> Self {
        Self::HashObject(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Value>> FromIterator<T> for Value {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::List(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eq_object_and_hash_object_with_same_entries_are_equal() {
        let mut ordered = BTreeMap::new();
        ordered.insert("a".to_string(), Value::Integer(1));
        ordered.insert("b".to_string(), Value::from("x"));
        let hashed: HashMap<_, _> = ordered.clone().into_iter().collect();

        assert_eq!(Value::Object(ordered.clone()), Value::HashObject(hashed.clone()));
        assert_eq!(Value::HashObject(hashed), Value::Object(ordered));
    }

    #[test]
    fn test_eq_integer_and_double_are_distinct() {
        assert_ne!(Value::Integer(1), Value::Double(1.0));
    }

    #[test]
    fn test_kind_reports_object_for_both_object_variants() {
        assert_eq!(Value::Object(BTreeMap::new()).kind(), ValueKind::Object);
        assert_eq!(Value::HashObject(HashMap::new()).kind(), ValueKind::Object);
    }

    #[test]
    fn test_from_vec_builds_list() {
        let v = Value::from(vec![1i64, 2, 3]);
        assert_eq!(
            v,
            Value::List(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
        );
    }

    #[test]
    fn test_get_looks_up_both_object_variants() {
        let mut map = HashMap::new();
        map.insert("k".to_string(), Value::Bool(true));
        assert_eq!(Value::HashObject(map).get("k"), Some(&Value::Bool(true)));
        assert_eq!(Value::Null.get("k"), None);
    }

    #[test]
    fn test_default_is_null() {
        assert!(Value::default().is_null());
    }
}
