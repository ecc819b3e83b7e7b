use bridge_traits::error::BridgeError;
use bridge_traits::http::HttpResponse;
use core_auth::AuthError;
use thiserror::Error;

/// Failure of a single request/response exchange.
#[derive(Error, Debug)]
pub enum RequestError {
    /// The server answered with a non-2xx status. The raw response is kept
    /// so callers can inspect the body.
    #[error("Server returned status {status}")]
    Status { status: u16, response: HttpResponse },

    #[error("Not authenticated: {0}")]
    Auth(#[from] AuthError),

    #[error("Transport error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Failed to decode response body: {0}")]
    Decode(String),
}

impl RequestError {
    /// HTTP status when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure on the duplex channel.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The channel is between connections; the message was dropped.
    #[error("Channel is not open")]
    NotOpen,

    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Socket error: {0}")]
    Io(String),

    #[error("Not authenticated: {0}")]
    Auth(#[from] AuthError),

    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RequestError>;
pub type TransportResult<T> = std::result::Result<T, TransportError>;
