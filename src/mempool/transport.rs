//! Streaming transport behind the supervisor.
//!
//! The supervisor only needs "open a connection" and "send / receive text";
//! the WebSocket implementation lives here so tests can swap in their own.

use crate::errors::{AppError, Result};
use crate::models::Endpoint;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;
use url::Url;

/// Opens connections to a streaming endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    type Conn: Connection;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Conn>;
}

/// One live connection.
#[async_trait]
pub trait Connection: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next text payload. `None` once the peer has closed the connection.
    async fn next_text(&mut self) -> Option<Result<String>>;

    /// Best-effort close; errors are ignored.
    async fn close(&mut self);
}

/// `wss://` via tokio-tungstenite with rustls and the webpki root store.
/// Certificates are always verified; plaintext `ws://` is only reachable when
/// configuration explicitly allowed it.
#[derive(Debug, Default, Clone)]
pub struct WsTransport;

pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    type Conn = WsConnection;

    async fn connect(&self, endpoint: &Endpoint) -> Result<WsConnection> {
        let url = Url::parse(&endpoint.url)?;
        let (stream, _resp) = connect_async(url.as_str()).await?;
        Ok(WsConnection { stream })
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn next_text(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => {
                        debug!("[WS] dropping non-UTF-8 binary frame");
                        continue;
                    }
                },
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "[WS] peer sent close");
                    return None;
                }
                // Pings are answered by tungstenite while reading.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                Err(e) => return Some(Err(AppError::from(e))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "[WS] close failed");
        }
    }
}
