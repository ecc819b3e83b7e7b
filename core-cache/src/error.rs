use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    /// The store could not be created or extended. The registry drops the
    /// database and later lookups become cache misses.
    #[error("Failed to provision cache database '{database}': {message}")]
    Provision { database: String, message: String },

    /// The stability check gave up with databases still out of line.
    #[error("Cache schema not stable after {attempts} checks (pending: {pending:?})")]
    Unstable { attempts: u32, pending: Vec<String> },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid record for '{id}': {message}")]
    InvalidRecord { id: String, message: String },

    #[error("Invalid name: {0}")]
    InvalidName(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;
