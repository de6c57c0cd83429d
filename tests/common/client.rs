//! Test relay client.
//!
//! Wraps a WebSocket connection, reads the session id the server sends on
//! connect, and offers send/receive helpers with timeouts.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// A test relay client.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    id: String,
}

impl TestClient {
    /// Connect to a relay and read the assigned session id.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        Self::connect_request(url.into_client_request()?).await
    }

    /// Connect sending the given `Origin` header.
    pub async fn connect_with_origin(url: &str, origin: &str) -> anyhow::Result<Self> {
        let mut request = url.into_client_request()?;
        request.headers_mut().insert("Origin", HeaderValue::from_str(origin)?);
        Self::connect_request(request).await
    }

    async fn connect_request(request: Request) -> anyhow::Result<Self> {
        let (ws, _) = connect_async(request).await?;
        let mut client = Self {
            ws,
            id: String::new(),
        };
        client.id = client.recv().await?;
        Ok(client)
    }

    /// The session id the server assigned.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Send one text frame.
    pub async fn send(&mut self, frame: &str) -> anyhow::Result<()> {
        self.ws.send(Message::Text(frame.to_string())).await?;
        Ok(())
    }

    /// Receive a single text frame.
    pub async fn recv(&mut self) -> anyhow::Result<String> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive a text frame with a timeout. Control frames are skipped.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<String> {
        loop {
            match timeout(dur, self.ws.next()).await? {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Close(frame))) => anyhow::bail!("connection closed: {frame:?}"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => anyhow::bail!("connection closed"),
            }
        }
    }

    /// Assert no text frame arrives within a short window.
    pub async fn expect_silence(&mut self) {
        if let Ok(frame) = self.recv_timeout(Duration::from_millis(200)).await {
            panic!("expected no frame, got {frame:?}");
        }
    }

    /// Wait for the server to close the connection.
    pub async fn expect_closed(&mut self) -> anyhow::Result<()> {
        loop {
            match timeout(Duration::from_secs(5), self.ws.next()).await? {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return Ok(()),
                Some(Ok(Message::Text(text))) => anyhow::bail!("unexpected frame {text:?}"),
                Some(Ok(_)) => continue,
            }
        }
    }

    /// Close the connection from the client side.
    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
