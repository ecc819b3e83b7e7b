//! WebSocket Connector using tokio-tungstenite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    websocket::{
        WebSocketConnection, WebSocketConnector, WebSocketReceiver, WebSocketSender, WsFrame,
    },
};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens `ws://` and `wss://` sockets with a bounded handshake time.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    connect_timeout: Duration,
}

impl TungsteniteConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl WebSocketConnector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<WebSocketConnection> {
        debug!(url, "Opening WebSocket");

        let handshake = tokio_tungstenite::connect_async(url);
        let (socket, response) = match tokio::time::timeout(self.connect_timeout, handshake).await
        {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                warn!(url, error = %e, "WebSocket handshake failed");
                return Err(BridgeError::Connection(e.to_string()));
            }
            Err(_) => {
                return Err(BridgeError::Timeout(format!(
                    "WebSocket handshake to {} exceeded {:?}",
                    url, self.connect_timeout
                )))
            }
        };

        debug!(url, status = response.status().as_u16(), "WebSocket open");

        let (sink, stream) = socket.split();
        Ok(WebSocketConnection {
            sender: Box::new(TungsteniteSender { sink }),
            receiver: Box::new(TungsteniteReceiver { stream }),
        })
    }
}

struct TungsteniteSender {
    sink: SplitSink<Socket, Message>,
}

#[async_trait]
impl WebSocketSender for TungsteniteSender {
    async fn send(&mut self, frame: WsFrame) -> Result<()> {
        let message = match frame {
            WsFrame::Text(text) => Message::Text(text),
            WsFrame::Binary(data) => Message::Binary(data.to_vec()),
            WsFrame::Close(_) => return self.close().await,
        };
        self.sink
            .send(message)
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("WebSocket send failed: {}", e)))
    }

    async fn close(&mut self) -> Result<()> {
        self.sink
            .close()
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("WebSocket close failed: {}", e)))
    }
}

struct TungsteniteReceiver {
    stream: SplitStream<Socket>,
}

#[async_trait]
impl WebSocketReceiver for TungsteniteReceiver {
    async fn next_frame(&mut self) -> Option<Result<WsFrame>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(BridgeError::Connection(e.to_string()))),
            };

            match message {
                Message::Text(text) => return Some(Ok(WsFrame::Text(text))),
                Message::Binary(data) => return Some(Ok(WsFrame::Binary(Bytes::from(data)))),
                Message::Close(frame) => {
                    let reason = frame.map(|f| f.reason.into_owned());
                    return Some(Ok(WsFrame::Close(reason)));
                }
                // control frames are answered by tungstenite itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }
}
