//! Wire protocol for linerpc.
//!
//! This crate defines what travels between two peers:
//!
//! - **Values** ([`Value`]): the dynamic, JSON-compatible tree every
//!   argument, return value and event payload is expressed in.
//! - **JSON codec** ([`encode`], [`decode`]): text form of a value, with
//!   optional leniency on the decode side.
//! - **Frames** ([`Frame`], [`CommandFrame`], [`ResponseFrame`]): the
//!   one-line command and response messages.
//! - **Framing** ([`LineBuffer`]): cutting a byte stream into lines.
//!
//! It knows nothing about streams, objects or dispatch.
//!
//! ```text
//! Transport (bytes) → LineBuffer (lines) → Frame (name, args | code, value)
//! ```
//!
//! # Feature Flags
//!
//! - `serde` (default): `Serialize` for [`Value`] and conversions to and
//!   from `serde_json::Value`.

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod error;
mod framing;
pub mod json;
#[cfg(feature = "serde")]
mod serde_bridge;
mod value;
mod wire;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use error::{FrameError, JsonError, ProtocolError};
pub use framing::LineBuffer;
pub use json::{DecodeOptions, EncodeOptions, decode, decode_optional, encode};
pub use value::{Value, ValueKind};
pub use wire::{CommandFrame, ErrorCode, Frame, ResponseFrame};
