//! WebSocket Abstraction
//!
//! A connector opens a duplex socket and hands back independent sender and
//! receiver halves, so a caller can wait for inbound frames while writing
//! outbound ones from another branch of the same task.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// A single WebSocket frame as seen by the core.
///
/// Ping/pong handling is the implementation's responsibility and never
/// surfaces here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsFrame {
    Text(String),
    Binary(Bytes),
    /// Peer-initiated close, with the close reason if one was sent
    Close(Option<String>),
}

/// Outbound half of an open socket.
#[async_trait]
pub trait WebSocketSender: Send {
    async fn send(&mut self, frame: WsFrame) -> Result<()>;

    /// Start the closing handshake. Further sends fail.
    async fn close(&mut self) -> Result<()>;
}

/// Inbound half of an open socket.
#[async_trait]
pub trait WebSocketReceiver: Send {
    /// Next frame from the peer; `None` once the socket is gone.
    async fn next_frame(&mut self) -> Option<Result<WsFrame>>;
}

/// An established connection split into its two halves.
pub struct WebSocketConnection {
    pub sender: Box<dyn WebSocketSender>,
    pub receiver: Box<dyn WebSocketReceiver>,
}

impl std::fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnection").finish_non_exhaustive()
    }
}

/// Opens WebSocket connections.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::websocket::{WebSocketConnector, WsFrame};
///
/// async fn hello(connector: &dyn WebSocketConnector) -> Result<()> {
///     let mut conn = connector.connect("wss://example.com/socket").await?;
///     conn.sender.send(WsFrame::Text("[\"ping\"]".into())).await?;
///     let reply = conn.receiver.next_frame().await;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait WebSocketConnector: Send + Sync {
    /// Perform the opening handshake against `url`.
    ///
    /// # Errors
    ///
    /// Returns error if the TCP/TLS connection or the upgrade handshake fails.
    async fn connect(&self, url: &str) -> Result<WebSocketConnection>;
}
