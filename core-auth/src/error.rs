use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// The identity provider rejected or failed the login; the session cannot start.
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    /// A token renewal failed; the refresh daemon retries on its next tick.
    #[error("Token refresh failed: {0}")]
    RefreshFailure(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Readiness gate '{gate}' failed: {message}")]
    NotReady { gate: String, message: String },

    #[error("OAuth state mismatch: expected {expected}, got {actual}")]
    StateMismatch { expected: String, actual: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse provider response: {0}")]
    Parse(String),
}

impl AuthError {
    /// Re-label any failure during credential acquisition as a fatal login failure.
    pub(crate) fn into_auth_failure(self) -> Self {
        match self {
            AuthError::AuthFailure(_) => self,
            other => AuthError::AuthFailure(other.to_string()),
        }
    }

    /// Re-label any failure during renewal as a recoverable refresh failure.
    pub(crate) fn into_refresh_failure(self) -> Self {
        match self {
            AuthError::RefreshFailure(_) => self,
            other => AuthError::RefreshFailure(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
