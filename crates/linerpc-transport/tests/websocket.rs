//! Integration tests for the WebSocket stream.
//!
//! A real listener and a real client run on loopback; each side is
//! driven through the `ByteStream` trait only.

#[cfg(feature = "websocket")]
mod websocket {
    use linerpc_transport::{
        ByteStream, Transport, TransportError, WebSocketTransport, connect_websocket,
    };

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        // Port 0 lets the OS pick; read the real one back.
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("should have addr");

        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });

        let client = connect_websocket(&format!("ws://{addr}"))
            .await
            .expect("client should connect");
        let server = server_handle.await.expect("task should complete");

        assert!(server.id().into_inner() > 0);
        assert_ne!(server.id(), client.id());

        server.send(b"0 5\n").await.expect("send should succeed");
        let got = client.recv().await.unwrap().expect("should have data");
        assert_eq!(got, b"0 5\n");

        client.send(b"add [2,3]\n").await.unwrap();
        let got = server.recv().await.unwrap().expect("should have data");
        assert_eq!(got, b"add [2,3]\n");

        server.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().unwrap();

        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });

        let client = connect_websocket(&format!("ws://{addr}")).await.unwrap();
        let server = server_handle.await.unwrap();

        client.close().await.unwrap();

        let result = server.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_websocket_text_message_is_delivered_as_bytes() {
        use futures_util::SinkExt;
        use tokio_tungstenite::tungstenite::Message;

        let mut transport = WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();
        let server_handle =
            tokio::spawn(async move { transport.accept().await.unwrap() });

        let (mut raw, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();
        let server = server_handle.await.unwrap();

        raw.send(Message::Text("async ping []\n".into())).await.unwrap();
        let got = server.recv().await.unwrap().unwrap();
        assert_eq!(got, b"async ping []\n");
    }

    #[tokio::test]
    async fn test_websocket_shutdown_rejects_further_accepts() {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
        transport.shutdown().await.expect("shutdown");

        assert!(transport.local_addr().is_err());
        assert!(matches!(
            transport.accept().await,
            Err(TransportError::Shutdown)
        ));
    }
}
