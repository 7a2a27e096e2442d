//! Transport seam between the push service client and the network.
//!
//! The client only needs "dial with headers", "send a text frame" and
//! "read the next text frame". [`Dialer`] and [`Connection`] capture
//! exactly that, which keeps the state machine testable with an in-memory
//! transport. [`WebSocketDialer`] is the production implementation on
//! top of `tokio-tungstenite`.

// Rust guideline compliant 2026-02

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

/// Opens connections to the push service.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Connection type produced by this dialer.
    type Connection: Connection;

    /// Open a connection to `url`, sending `headers` with the upgrade request.
    async fn dial(&self, url: &str, headers: &[(String, String)]) -> Result<Self::Connection>;
}

/// One open, ordered, text-frame connection.
#[async_trait]
pub trait Connection: Send {
    /// Send one text frame.
    async fn send_text(&mut self, text: &str) -> Result<()>;

    /// Wait for the next text frame.
    ///
    /// Any error, including a close frame or end of stream, means the
    /// connection is unusable.
    async fn recv_text(&mut self) -> Result<String>;

    /// Close the connection. Errors are ignored.
    async fn close(&mut self);
}

/// Concrete WebSocket stream type.
type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Dials secure WebSocket connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketDialer;

/// A WebSocket connection to the push service.
#[derive(Debug)]
pub struct WebSocketConnection {
    stream: WsStream,
}

#[async_trait]
impl Dialer for WebSocketDialer {
    type Connection = WebSocketConnection;

    async fn dial(&self, url: &str, headers: &[(String, String)]) -> Result<WebSocketConnection> {
        use tungstenite::client::IntoClientRequest;

        let mut request = url
            .into_client_request()
            .with_context(|| format!("invalid WebSocket URL: {url}"))?;

        for (name, value) in headers {
            let header_name = tungstenite::http::HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid header name: {name}"))?;
            let header_value = tungstenite::http::HeaderValue::from_str(value)
                .with_context(|| format!("invalid header value for {name}"))?;
            request.headers_mut().insert(header_name, header_value);
        }

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .with_context(|| format!("WebSocket connect to {url} failed"))?;

        Ok(WebSocketConnection { stream })
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.stream
            .send(tungstenite::Message::Text(text.to_string()))
            .await
            .context("WebSocket send failed")
    }

    async fn recv_text(&mut self) -> Result<String> {
        loop {
            match self.stream.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(tungstenite::Message::Ping(data))) => {
                    self.stream
                        .send(tungstenite::Message::Pong(data))
                        .await
                        .context("WebSocket pong failed")?;
                }
                Some(Ok(tungstenite::Message::Binary(data))) => {
                    log::debug!("[PushService] Ignoring {}-byte binary frame", data.len());
                }
                Some(Ok(tungstenite::Message::Pong(_) | tungstenite::Message::Frame(_))) => {}
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|cf| (u16::from(cf.code), cf.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    anyhow::bail!("WebSocket closed by peer ({code}: {reason})");
                }
                Some(Err(e)) => return Err(anyhow::anyhow!("WebSocket read error: {e}")),
                None => anyhow::bail!("WebSocket stream ended"),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            log::debug!("[PushService] Close failed: {}", e);
        }
    }
}
