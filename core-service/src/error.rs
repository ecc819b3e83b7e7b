use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] core_auth::AuthError),

    #[error("Request error: {0}")]
    Request(#[from] core_net::RequestError),

    #[error("Cache error: {0}")]
    Cache(#[from] core_cache::CacheError),

    #[error("Object store error: {0}")]
    Tree(#[from] provider_object_store::TreeError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::error::BridgeError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to decode {what}: {message}")]
    Decode { what: String, message: String },
}

pub type Result<T> = std::result::Result<T, ServiceError>;
