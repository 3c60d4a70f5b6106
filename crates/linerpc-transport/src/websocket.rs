//! WebSocket streams using `tokio-tungstenite`.
//!
//! Line framing happens above this layer, so message boundaries are
//! ignored: every text or binary message is handed up as a chunk of the
//! byte stream, and every `send` becomes one binary message.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::tungstenite::Message;

use crate::{ByteStream, StreamId, Transport, TransportError};

type WsStream<S> = tokio_tungstenite::WebSocketStream<S>;

fn ws_error(kind: std::io::ErrorKind, e: tokio_tungstenite::tungstenite::Error) -> std::io::Error {
    std::io::Error::new(kind, e)
}

/// A WebSocket-based [`Transport`] that listens for incoming peers.
pub struct WebSocketTransport {
    listener: Option<TcpListener>,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self {
            listener: Some(listener),
        })
    }

    /// Returns the address the listener is bound to.
    ///
    /// Fails with `NotConnected` once the transport has been shut down.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        match &self.listener {
            Some(listener) => listener.local_addr(),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "transport shut down",
            )),
        }
    }
}

impl Transport for WebSocketTransport {
    type Stream = WebSocketStream<tokio::net::TcpStream>;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Stream, Self::Error> {
        let listener = self.listener.as_ref().ok_or(TransportError::Shutdown)?;
        let (socket, addr) = listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let ws = tokio_tungstenite::accept_async(socket).await.map_err(|e| {
            TransportError::AcceptFailed(ws_error(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })?;

        let stream = WebSocketStream::new(ws);
        tracing::debug!(id = %stream.id, %addr, "accepted WebSocket peer");
        Ok(stream)
    }

    async fn shutdown(&mut self) -> Result<(), Self::Error> {
        if self.listener.take().is_some() {
            tracing::info!("WebSocket transport shut down");
        }
        Ok(())
    }
}

/// Connects to a WebSocket peer at `url` (e.g. `ws://127.0.0.1:9000`).
pub async fn connect_websocket(
    url: &str,
) -> Result<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>, TransportError> {
    let (ws, _) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
        TransportError::ConnectFailed {
            addr: url.to_string(),
            source: ws_error(std::io::ErrorKind::ConnectionRefused, e),
        }
    })?;
    tracing::info!(url, "connected to WebSocket peer");
    Ok(WebSocketStream::new(ws))
}

/// A single WebSocket connection used as a byte stream.
///
/// The socket is split so the sink and the stream lock independently.
pub struct WebSocketStream<S> {
    id: StreamId,
    sink: Mutex<SplitSink<WsStream<S>, Message>>,
    stream: Mutex<SplitStream<WsStream<S>>>,
}

impl<S> WebSocketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn new(ws: WsStream<S>) -> Self {
        let (sink, stream) = ws.split();
        Self {
            id: StreamId::next(),
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

impl<S> ByteStream for WebSocketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let msg = Message::Binary(data.to_vec().into());
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(ws_error(std::io::ErrorKind::BrokenPipe, e))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(ws_error(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(ws_error(std::io::ErrorKind::BrokenPipe, e))
        })
    }

    fn id(&self) -> StreamId {
        self.id
    }
}
