//! Objects exposed over RPC and the interfaces that describe them.
//!
//! Nothing here is discovered at runtime. An application type implements
//! [`RpcObject`] and lists its callable members and emittable events in
//! an [`Interface`]:
//!
//! ```rust
//! use std::sync::Arc;
//! use linerpc_dispatch::{Interface, RpcObject, TypeDescriptor};
//!
//! struct Calculator;
//!
//! impl RpcObject for Calculator {
//!     fn interface(self: Arc<Self>) -> Interface {
//!         Interface::builder("Calculator")
//!             .method("add", |a: i64, b: i64| a + b)
//!             .event("overflow", vec![TypeDescriptor::Integer])
//!             .build()
//!     }
//! }
//!
//! let iface = Arc::new(Calculator).interface();
//! assert_eq!(iface.methods_named("add").count(), 1);
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{EventEmitter, Handler, MarshalError, Method, TypeDescriptor};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// An event an object can emit: a name and its parameter descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventDescriptor {
    name: String,
    params: Vec<TypeDescriptor>,
}

impl EventDescriptor {
    pub fn new(name: impl Into<String>, params: Vec<TypeDescriptor>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Parses a signature such as `notify(integer,text)` or `notify()`.
    ///
    /// A bare name without parentheses declares an event with no
    /// parameters.
    pub fn parse(signature: &str) -> Result<Self, MarshalError> {
        let signature = signature.trim();
        let Some(open) = signature.find('(') else {
            return Ok(Self::new(signature, Vec::new()));
        };
        let inner = signature[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| MarshalError::InvalidDescriptor(signature.to_string()))?;
        let name = signature[..open].trim();
        if name.is_empty() {
            return Err(MarshalError::InvalidDescriptor(signature.to_string()));
        }

        let params = split_params(inner)
            .into_iter()
            .map(str::parse)
            .collect::<Result<Vec<TypeDescriptor>, _>>()?;
        Ok(Self::new(name, params))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[TypeDescriptor] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// `name(p1,p2)` in normalized descriptor form.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        format!("{}({})", self.name, params.join(","))
    }
}

/// Splits a parameter list on commas outside angle brackets.
fn split_params(inner: &str) -> Vec<&str> {
    if inner.trim().is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&inner[start..]);
    parts
}

/// Strips an overload signature from a member reference:
/// `add(integer,integer)` becomes `add`.
pub(crate) fn bare_name(member: &str) -> &str {
    member.split('(').next().unwrap_or(member).trim()
}

// ---------------------------------------------------------------------------
// Interface
// ---------------------------------------------------------------------------

/// The callable surface of an object: its methods (overloads allowed) and
/// the events it emits.
#[derive(Debug, Clone)]
pub struct Interface {
    type_name: String,
    methods: Vec<Method>,
    events: Vec<EventDescriptor>,
}

impl Interface {
    pub fn builder(type_name: impl Into<String>) -> InterfaceBuilder {
        InterfaceBuilder {
            type_name: type_name.into(),
            methods: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn events(&self) -> &[EventDescriptor] {
        &self.events
    }

    /// All overloads literally named `name`.
    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Method> + 'a {
        self.methods.iter().filter(move |m| m.name() == name)
    }

    /// The event named `name`, if declared.
    pub fn event(&self, name: &str) -> Option<&EventDescriptor> {
        self.events.iter().find(|e| e.name() == name)
    }
}

/// Builder for [`Interface`].
#[derive(Debug)]
pub struct InterfaceBuilder {
    type_name: String,
    methods: Vec<Method>,
    events: Vec<EventDescriptor>,
}

impl InterfaceBuilder {
    /// Adds a method backed by a closure. Registering the same name again
    /// adds an overload.
    pub fn method<Args: 'static, H: Handler<Args>>(
        mut self,
        name: impl Into<String>,
        handler: H,
    ) -> Self {
        self.methods.push(Method::new(name, handler));
        self
    }

    /// Adds an already built [`Method`].
    pub fn add_method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    pub fn event(mut self, name: impl Into<String>, params: Vec<TypeDescriptor>) -> Self {
        self.events.push(EventDescriptor::new(name, params));
        self
    }

    pub fn add_event(mut self, event: EventDescriptor) -> Self {
        self.events.push(event);
        self
    }

    pub fn build(self) -> Interface {
        Interface {
            type_name: self.type_name,
            methods: self.methods,
            events: self.events,
        }
    }
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

/// An application object that can be exposed over RPC.
///
/// `interface` takes `self: Arc<Self>` so method closures can capture a
/// handle to the object.
pub trait RpcObject: Send + Sync + 'static {
    fn interface(self: Arc<Self>) -> Interface;

    /// Receives the emitter the object should publish its events through.
    /// Called once, when the object is registered.
    fn attach(&self, emitter: EventEmitter) {
        let _ = emitter;
    }
}

/// Counter for generating unique object IDs.
static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a registered object within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj-{}", self.0)
    }
}

/// An object's interface paired with the id it was registered under.
/// This is what the dispatcher and the forwarder hold on to.
#[derive(Debug)]
pub struct BoundObject {
    id: ObjectId,
    interface: Interface,
}

impl BoundObject {
    pub fn new(interface: Interface) -> Arc<Self> {
        Arc::new(Self {
            id: ObjectId::next(),
            interface,
        })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn type_name(&self) -> &str {
        self.interface.type_name()
    }

    pub fn interface(&self) -> &Interface {
        &self.interface
    }
}

impl fmt::Display for BoundObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.interface.type_name(), self.id)
    }
}
