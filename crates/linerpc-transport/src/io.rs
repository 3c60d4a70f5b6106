//! [`ByteStream`] over any tokio reader/writer pair.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;

use crate::{ByteStream, StreamId, TransportError};

/// Size of a single read.
const READ_CHUNK: usize = 4096;

/// A byte stream built from separate read and write halves.
///
/// Each half sits behind its own lock, so a task blocked in
/// [`recv`](ByteStream::recv) never delays a concurrent
/// [`send`](ByteStream::send).
pub struct IoStream<R, W> {
    id: StreamId,
    reader: Mutex<R>,
    writer: Mutex<W>,
}

impl<R, W> IoStream<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps a reader and a writer into one stream.
    pub fn new(reader: R, writer: W) -> Self {
        let id = StreamId::next();
        tracing::debug!(%id, "stream opened");
        Self {
            id,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }
}

impl<S> IoStream<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Splits a duplex I/O object (pipe, serial port, in-memory duplex)
    /// into a stream.
    pub fn split(io: S) -> Self {
        let (reader, writer) = tokio::io::split(io);
        Self::new(reader, writer)
    }
}

impl<R, W> ByteStream for IoStream<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(data)
            .await
            .map_err(TransportError::SendFailed)?;
        writer.flush().await.map_err(TransportError::SendFailed)
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut reader = self.reader.lock().await;
        let mut buf = vec![0u8; READ_CHUNK];
        let n = reader
            .read(&mut buf)
            .await
            .map_err(TransportError::ReceiveFailed)?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.writer
            .lock()
            .await
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }

    fn id(&self) -> StreamId {
        self.id
    }
}
