//! Byte-stream layer for linerpc.
//!
//! The RPC layer never assumes TCP. It only needs something that can
//! write bytes, hand back whatever bytes became readable, and close.
//! That contract is the [`ByteStream`] trait. [`Transport`] is the
//! listening side that produces streams.
//!
//! Provided implementations:
//!
//! - [`IoStream`] wraps any tokio `AsyncRead` + `AsyncWrite` pair, which
//!   covers TCP sockets, Unix pipes, serial ports and in-memory duplex
//!   pipes used in tests.
//! - [`TcpTransport`] listens for TCP peers; [`connect_tcp`] dials one.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket streams via `tokio-tungstenite`,
//!   where each message is treated as a chunk of the byte stream.

#![allow(async_fn_in_trait)]

mod error;
mod io;
mod tcp;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use io::IoStream;
pub use tcp::{TcpStream, TcpTransport, connect_tcp};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketStream, WebSocketTransport, connect_websocket};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique stream IDs.
static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(u64);

impl StreamId {
    /// Creates a new `StreamId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique id.
    pub fn next() -> Self {
        Self(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// Accepts new incoming streams.
pub trait Transport: Send + Sync + 'static {
    /// The stream type produced by this transport.
    type Stream: ByteStream;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Waits for and accepts the next incoming stream.
    async fn accept(&mut self) -> Result<Self::Stream, Self::Error>;

    /// Stops accepting new streams and releases the listener. Streams
    /// already accepted are unaffected. Later `accept` calls fail.
    async fn shutdown(&mut self) -> Result<(), Self::Error>;
}

/// A bidirectional byte stream.
///
/// `send` and `recv` may be called concurrently from different tasks:
/// the connection layer runs one reader task and one writer task over
/// the same stream. Implementations must not hold a shared lock across
/// both directions.
///
/// The futures are declared `Send` so a stream can be driven from
/// spawned tasks.
pub trait ByteStream: Send + Sync + 'static {
    /// The error type for stream operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Writes all of `data` to the peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Waits until bytes are readable and returns them.
    ///
    /// Chunk boundaries carry no meaning. Returns `Ok(None)` once the
    /// peer has closed its side.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    /// Closes the write side of the stream.
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Returns the unique identifier for this stream.
    fn id(&self) -> StreamId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_id_new_and_into_inner() {
        let id = StreamId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_stream_id_display() {
        assert_eq!(StreamId::new(7).to_string(), "stream-7");
    }

    #[test]
    fn test_stream_id_next_is_unique() {
        let a = StreamId::next();
        let b = StreamId::next();
        assert_ne!(a, b);
        assert!(b.into_inner() > a.into_inner());
    }
}
