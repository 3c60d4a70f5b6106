//! Type marshaling, command dispatch and event forwarding for linerpc.
//!
//! This crate sits between the wire ([`linerpc_protocol`]) and the
//! connection. It answers two questions:
//!
//! 1. **Incoming command**: given a name and a list of untyped values,
//!    which method runs? ([`CommandDispatcher`])
//! 2. **Outgoing event**: an object fired an event; which command does
//!    the peer receive, with what arguments? ([`EventForwarder`])
//!
//! Both rely on the same machinery: [`TypeDescriptor`]s describe native
//! parameter types, and the [`Marshaler`] matches and converts
//! [`Value`](linerpc_protocol::Value)s against them.
//!
//! # How it fits in the stack
//!
//! ```text
//! Connection (above)  ← feeds commands in, sends forwarded events out
//!     ↕
//! Dispatch (this crate)  ← objects, methods, overloads, events
//!     ↕
//! Protocol (below)  ← Value, frames
//! ```

mod descriptor;
mod dispatcher;
mod error;
mod events;
mod marshal;
mod method;
mod object;

pub use descriptor::TypeDescriptor;
pub use dispatcher::{CommandDispatcher, ResolvedCall};
pub use error::{DispatchError, MarshalError};
pub use events::{
    EmittedEvent, EventBus, EventEmitter, EventForwarder, EventSubscriber, ForwardRequest,
};
pub use marshal::{FromValue, IntoValue, Marshaler, Typed};
pub use method::{Handler, Method};
pub use object::{BoundObject, EventDescriptor, Interface, InterfaceBuilder, ObjectId, RpcObject};
