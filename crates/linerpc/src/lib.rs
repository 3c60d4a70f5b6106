//! # linerpc
//!
//! Expose application objects over any byte stream as named commands,
//! and their events as outgoing notifications.
//!
//! Two peers talk in newline-terminated lines of text:
//!
//! ```text
//! add [2,3]                 →  call add(2, 3), wait for the response
//! 0 5                       ←  response: code 0, value 5
//! async notify [42,"hi"]    →  fire and forget, no response
//! ```
//!
//! Each side can both call and be called. There is no broker: one
//! [`Rpc`] serves one peer connection.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use linerpc::prelude::*;
//!
//! struct Calculator;
//!
//! impl RpcObject for Calculator {
//!     fn interface(self: Arc<Self>) -> Interface {
//!         Interface::builder("Calculator")
//!             .method("add", |a: i64, b: i64| a + b)
//!             .build()
//!     }
//! }
//!
//! # async fn run() -> Result<(), RpcError> {
//! let rpc = Rpc::new();
//! let calc = rpc.register(Arc::new(Calculator));
//! rpc.bind_all_members(&calc);
//!
//! let peer = rpc.connect_tcp("127.0.0.1:9000").await?;
//! let sum = rpc.call("add", vec![Value::from(2), Value::from(3)]).await?;
//! peer.closed().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! - [`linerpc_transport`]: byte streams (TCP, pipes, WebSocket).
//! - [`linerpc_protocol`]: values, JSON, wire frames.
//! - [`linerpc_dispatch`]: marshaling, overload resolution, events.
//! - this crate: the connection state machine and the [`Rpc`] facade.

mod config;
mod connection;
mod error;
mod forward;
mod rpc;

pub use config::{ConnectionConfig, DEFAULT_MAX_LINE_LEN};
pub use connection::{ConnectionHandle, Reply, spawn_connection};
pub use error::RpcError;
pub use rpc::{ObjectRef, Rpc, RpcBuilder};

pub use linerpc_dispatch;
pub use linerpc_protocol;
pub use linerpc_transport;

/// The types most applications need.
pub mod prelude {
    pub use crate::{ConnectionConfig, ConnectionHandle, ObjectRef, Rpc, RpcBuilder, RpcError};
    pub use linerpc_dispatch::{
        EventEmitter, Interface, IntoValue, RpcObject, TypeDescriptor,
    };
    pub use linerpc_protocol::{DecodeOptions, ErrorCode, Value};
}
