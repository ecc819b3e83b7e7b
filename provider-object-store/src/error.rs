//! Error types for the object store provider

use thiserror::Error;

/// Object tree, bucket and access key errors
#[derive(Error, Debug)]
pub enum TreeError {
    /// The REST exchange failed or the server answered non-2xx
    #[error(transparent)]
    Request(#[from] core_net::RequestError),

    /// Direct bridge call failed (login handshake)
    #[error(transparent)]
    Bridge(#[from] bridge_traits::error::BridgeError),

    /// Local cache failure surfaced to the caller
    #[error(transparent)]
    Cache(#[from] core_cache::CacheError),

    /// A delete reached only one of the cache and the remote store
    #[error("Cache and remote store disagree for '{name}' (cache: {}, remote: {})",
        .cache.as_deref().unwrap_or("ok"),
        .remote.as_deref().unwrap_or("ok"))]
    Inconsistent {
        name: String,
        /// Cache-side failure, if any
        cache: Option<String>,
        /// Remote-side failure, if any
        remote: Option<String>,
    },

    /// Caller-supplied value rejected before any request was made
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Response or cached payload could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for object store operations
pub type Result<T> = std::result::Result<T, TreeError>;

impl TreeError {
    /// HTTP status of a rejected request, if that is what failed.
    pub fn status(&self) -> Option<u16> {
        match self {
            TreeError::Request(e) => e.status(),
            _ => None,
        }
    }
}
