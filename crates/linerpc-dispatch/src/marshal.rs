//! Conversion between dynamic [`Value`]s and native Rust types.
//!
//! Three traits describe a native type:
//!
//! - [`Typed`]: its [`TypeDescriptor`], computed without a value.
//! - [`FromValue`]: how to build it from a value that already matched.
//! - [`IntoValue`]: how to turn it back into a value.
//!
//! The [`Marshaler`] applies the structural rules on top: scalars must
//! match exactly, containers match element by element, and named types
//! are accepted only when registered as integer-carried.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use linerpc_protocol::Value;

use crate::{MarshalError, TypeDescriptor};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A native type with a fixed descriptor.
pub trait Typed {
    fn descriptor() -> TypeDescriptor;
}

/// Builds a native value from a dynamic one.
///
/// Called only after [`Marshaler::matches`] accepted the value, but
/// implementations still reject mismatches rather than coerce.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, MarshalError>;
}

/// Turns a native value into a dynamic one.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

fn mismatch(expected: &TypeDescriptor, found: &Value) -> MarshalError {
    MarshalError::Mismatch {
        expected: expected.to_string(),
        found: found.kind(),
    }
}

// ---------------------------------------------------------------------------
// Marshaler
// ---------------------------------------------------------------------------

/// Applies descriptors to values.
///
/// Holds the set of application type names carried as integers on the
/// wire (enums, typically). The set belongs to this marshaler; separate
/// marshalers can be configured differently.
#[derive(Debug, Clone, Default)]
pub struct Marshaler {
    integer_types: BTreeSet<String>,
}

impl Marshaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_integer_types<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            integer_types: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Registers `type_name` as carried by its integer ordinal.
    pub fn treat_as_integer(&mut self, type_name: impl Into<String>) {
        self.integer_types.insert(type_name.into());
    }

    pub fn is_integer_type(&self, type_name: &str) -> bool {
        self.integer_types.contains(type_name)
    }

    /// Whether `value` fits `desc`. Allocation-free.
    pub fn matches(&self, desc: &TypeDescriptor, value: &Value) -> bool {
        match (desc, value) {
            (TypeDescriptor::Any, _) => true,
            (TypeDescriptor::Text, Value::Text(_)) => true,
            (TypeDescriptor::Integer, Value::Integer(_)) => true,
            (TypeDescriptor::Bool, Value::Bool(_)) => true,
            (TypeDescriptor::List(inner), Value::List(items)) => {
                items.iter().all(|item| self.matches(inner, item))
            }
            (TypeDescriptor::Map(inner), Value::Object(map)) => {
                map.values().all(|v| self.matches(inner, v))
            }
            (TypeDescriptor::Map(inner), Value::HashObject(map)) => {
                map.values().all(|v| self.matches(inner, v))
            }
            (TypeDescriptor::Named(name), Value::Integer(_)) => self.is_integer_type(name),
            (TypeDescriptor::Named(name), Value::Opaque { type_name, .. }) => {
                name == type_name && self.is_integer_type(name)
            }
            _ => false,
        }
    }

    /// Converts an incoming value into the native type `T` declared as `desc`.
    ///
    /// # Errors
    /// [`MarshalError::UnregisteredType`] for a named type outside the
    /// registry, [`MarshalError::Mismatch`] when the value doesn't fit.
    pub fn to_native<T: FromValue>(
        &self,
        desc: &TypeDescriptor,
        value: Value,
    ) -> Result<T, MarshalError> {
        let value = self.normalize(desc, value)?;
        T::from_value(value)
    }

    /// Converts a native-produced value into its wire form under `desc`.
    ///
    /// Registered opaque values become integers. Used for return values
    /// and for event arguments.
    ///
    /// # Errors
    /// [`MarshalError::UnregisteredType`] when an opaque value of an
    /// unregistered type is found anywhere in the tree;
    /// [`MarshalError::Mismatch`] when the value doesn't fit `desc`.
    pub fn from_native(&self, desc: &TypeDescriptor, value: Value) -> Result<Value, MarshalError> {
        self.normalize(desc, value)
    }

    /// Checks `value` against `desc` and rewrites registered opaque values
    /// as integers.
    fn normalize(&self, desc: &TypeDescriptor, value: Value) -> Result<Value, MarshalError> {
        match (desc, value) {
            (TypeDescriptor::Any, value) => self.normalize_any(value),
            (TypeDescriptor::Named(name), value) => {
                if !self.is_integer_type(name) {
                    return Err(MarshalError::UnregisteredType(name.clone()));
                }
                match value {
                    Value::Integer(n) => Ok(Value::Integer(n)),
                    Value::Opaque { type_name, ordinal } if type_name == *name => {
                        Ok(Value::Integer(ordinal))
                    }
                    other => Err(mismatch(desc, &other)),
                }
            }
            (TypeDescriptor::List(inner), Value::List(items)) => items
                .into_iter()
                .map(|item| self.normalize(inner, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            (TypeDescriptor::Map(inner), Value::Object(map)) => map
                .into_iter()
                .map(|(k, v)| self.normalize(inner, v).map(|v| (k, v)))
                .collect::<Result<BTreeMap<_, _>, MarshalError>>()
                .map(Value::Object),
            (TypeDescriptor::Map(inner), Value::HashObject(map)) => map
                .into_iter()
                .map(|(k, v)| self.normalize(inner, v).map(|v| (k, v)))
                .collect::<Result<HashMap<_, _>, MarshalError>>()
                .map(Value::HashObject),
            (desc, value) if self.matches(desc, &value) => Ok(value),
            (desc, value) => Err(mismatch(desc, &value)),
        }
    }

    fn normalize_any(&self, value: Value) -> Result<Value, MarshalError> {
        match value {
            Value::Opaque { type_name, ordinal } => {
                if self.is_integer_type(&type_name) {
                    Ok(Value::Integer(ordinal))
                } else {
                    Err(MarshalError::UnregisteredType(type_name))
                }
            }
            Value::List(items) => items
                .into_iter()
                .map(|item| self.normalize_any(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| self.normalize_any(v).map(|v| (k, v)))
                .collect::<Result<BTreeMap<_, _>, MarshalError>>()
                .map(Value::Object),
            Value::HashObject(map) => map
                .into_iter()
                .map(|(k, v)| self.normalize_any(v).map(|v| (k, v)))
                .collect::<Result<HashMap<_, _>, MarshalError>>()
                .map(Value::HashObject),
            scalar => Ok(scalar),
        }
    }
}

// ---------------------------------------------------------------------------
// Implementations for std types
// ---------------------------------------------------------------------------

impl Typed for Value {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Any
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, MarshalError> {
        Ok(value)
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl Typed for String {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Text
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, MarshalError> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(mismatch(&TypeDescriptor::Text, &other)),
        }
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::Text(self)
    }
}

impl Typed for &str {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Text
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::Text(self.to_string())
    }
}

impl Typed for bool {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Bool
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, MarshalError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch(&TypeDescriptor::Bool, &other)),
        }
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

macro_rules! integer_impls {
    ($($t:ty),*) => {
        $(
            impl Typed for $t {
                fn descriptor() -> TypeDescriptor {
                    TypeDescriptor::Integer
                }
            }

            impl FromValue for $t {
                fn from_value(value: Value) -> Result<Self, MarshalError> {
                    match value {
                        Value::Integer(n) => <$t>::try_from(n).map_err(|_| {
                            MarshalError::OutOfRange {
                                target: stringify!($t),
                                value: n,
                            }
                        }),
                        other => Err(mismatch(&TypeDescriptor::Integer, &other)),
                    }
                }
            }

            impl IntoValue for $t {
                fn into_value(self) -> Value {
                    Value::Integer(i64::from(self))
                }
            }
        )*
    };
}

integer_impls!(i8, i16, i32, i64, u8, u16, u32);

/// Unit return: the method produces no value.
impl Typed for () {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Any
    }
}

impl IntoValue for () {
    fn into_value(self) -> Value {
        Value::Null
    }
}

/// Doubles have no descriptor of their own and travel under `any`.
impl Typed for f64 {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Any
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Double(self)
    }
}

/// `None` travels as `null`, which no typed descriptor accepts, so
/// optional values are declared `any`.
impl<T> Typed for Option<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Any
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, MarshalError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        self.map_or(Value::Null, IntoValue::into_value)
    }
}

impl<T: Typed> Typed for Vec<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::list(T::descriptor())
    }
}

impl<T: FromValue + Typed> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self, MarshalError> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(mismatch(&Self::descriptor(), &other)),
        }
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self) -> Value {
        Value::List(self.into_iter().map(IntoValue::into_value).collect())
    }
}

/// Entries of either object variant, or a mismatch against `desc`.
fn object_entries(
    desc: &TypeDescriptor,
    value: Value,
) -> Result<Box<dyn Iterator<Item = (String, Value)>>, MarshalError> {
    match value {
        Value::Object(map) => Ok(Box::new(map.into_iter())),
        Value::HashObject(map) => Ok(Box::new(map.into_iter())),
        other => Err(mismatch(desc, &other)),
    }
}

impl<T: Typed> Typed for BTreeMap<String, T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::map(T::descriptor())
    }
}

impl<T: FromValue + Typed> FromValue for BTreeMap<String, T> {
    fn from_value(value: Value) -> Result<Self, MarshalError> {
        object_entries(&Self::descriptor(), value)?
            .map(|(k, v)| T::from_value(v).map(|v| (k, v)))
            .collect()
    }
}

impl<T: IntoValue> IntoValue for BTreeMap<String, T> {
    fn into_value(self) -> Value {
        Value::Object(self.into_iter().map(|(k, v)| (k, v.into_value())).collect())
    }
}

impl<T: Typed> Typed for HashMap<String, T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::map(T::descriptor())
    }
}

impl<T: FromValue + Typed> FromValue for HashMap<String, T> {
    fn from_value(value: Value) -> Result<Self, MarshalError> {
        object_entries(&Self::descriptor(), value)?
            .map(|(k, v)| T::from_value(v).map(|v| (k, v)))
            .collect()
    }
}

impl<T: IntoValue> IntoValue for HashMap<String, T> {
    fn into_value(self) -> Value {
        Value::HashObject(self.into_iter().map(|(k, v)| (k, v.into_value())).collect())
    }
}
