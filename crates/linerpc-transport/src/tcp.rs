//! TCP listener and dialer.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::{IoStream, Transport, TransportError};

/// A byte stream over a TCP socket.
pub type TcpStream = IoStream<OwnedReadHalf, OwnedWriteHalf>;

impl TcpStream {
    /// Wraps a connected socket.
    pub fn from_tcp(socket: tokio::net::TcpStream) -> Self {
        // Request/response traffic is line-sized; don't batch it.
        if let Err(e) = socket.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        }
        let (reader, writer) = socket.into_split();
        IoStream::new(reader, writer)
    }
}

/// Connects to a TCP peer.
pub async fn connect_tcp(addr: &str) -> Result<TcpStream, TransportError> {
    let socket = tokio::net::TcpStream::connect(addr).await.map_err(|e| {
        TransportError::ConnectFailed {
            addr: addr.to_string(),
            source: e,
        }
    })?;
    tracing::info!(addr, "connected to TCP peer");
    Ok(TcpStream::from_tcp(socket))
}

/// A TCP [`Transport`] that listens for incoming peers.
pub struct TcpTransport {
    listener: Option<TcpListener>,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "TCP transport listening");
        Ok(Self {
            listener: Some(listener),
        })
    }

    /// Returns the address the listener is bound to.
    ///
    /// Fails with `NotConnected` once the transport has been shut down.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        match &self.listener {
            Some(listener) => listener.local_addr(),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "transport shut down",
            )),
        }
    }
}

impl Transport for TcpTransport {
    type Stream = TcpStream;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Stream, Self::Error> {
        let listener = self.listener.as_ref().ok_or(TransportError::Shutdown)?;
        let (socket, addr) = listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        let stream = TcpStream::from_tcp(socket);
        tracing::debug!(id = %crate::ByteStream::id(&stream), %addr, "accepted TCP peer");
        Ok(stream)
    }

    async fn shutdown(&mut self) -> Result<(), Self::Error> {
        if self.listener.take().is_some() {
            tracing::info!("TCP transport shut down");
        }
        Ok(())
    }
}
