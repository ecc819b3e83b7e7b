//! Core types for session authentication.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Longest access token lifetime honoured; larger `expires_in` values are clamped
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

/// The token set issued by the identity provider for the current session.
///
/// # Security
///
/// Token values are never exposed through `Debug`; format them explicitly
/// only where a request needs them.
///
/// # Examples
///
/// ```
/// use core_auth::Credentials;
/// use std::time::Duration;
///
/// let credentials = Credentials::new("access".to_string(), Some("refresh".to_string()), None, 3600);
///
/// assert!(!credentials.expires_within(Duration::from_secs(300)));
/// assert_eq!(credentials.auth_header().as_str(), "Bearer access");
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Bearer token attached to every request
    pub access_token: String,
    /// Long-lived token used to obtain new access tokens
    pub refresh_token: Option<String>,
    /// OpenID Connect identity token, when the provider issues one
    pub id_token: Option<String>,
    /// When the access token expires (UTC)
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl Credentials {
    /// Create a token set expiring `expires_in` seconds from now.
    ///
    /// `expires_in` comes from the server and is clamped to
    /// `0..=MAX_TOKEN_LIFETIME_SECS`; a negative value yields an expired set.
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        id_token: Option<String>,
        expires_in: i64,
    ) -> Self {
        let now = chrono::Utc::now();
        let lifetime = chrono::TimeDelta::try_seconds(expires_in.clamp(0, MAX_TOKEN_LIFETIME_SECS))
            .unwrap_or_default();
        Self {
            access_token,
            refresh_token,
            id_token,
            expires_at: now.checked_add_signed(lifetime).unwrap_or(now),
        }
    }

    /// Whether the access token expires in less than `validity` from now.
    ///
    /// An already-expired token is always within any validity window.
    pub fn expires_within(&self, validity: Duration) -> bool {
        match chrono::Duration::from_std(validity)
            .ok()
            .and_then(|v| chrono::Utc::now().checked_add_signed(v))
        {
            Some(deadline) => deadline >= self.expires_at,
            None => true,
        }
    }

    /// Time remaining until expiry; `None` once expired.
    pub fn time_until_expiry(&self) -> Option<chrono::Duration> {
        let now = chrono::Utc::now();
        if now >= self.expires_at {
            None
        } else {
            Some(self.expires_at - now)
        }
    }

    /// Header value derived from the access token.
    pub fn auth_header(&self) -> AuthHeader {
        AuthHeader::bearer(&self.access_token)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// `Authorization` header value (`Bearer <token>`).
#[derive(Clone, PartialEq, Eq)]
pub struct AuthHeader(String);

impl AuthHeader {
    /// Header name the value belongs under.
    pub const NAME: &'static str = "Authorization";

    pub fn bearer(access_token: &str) -> Self {
        Self(format!("Bearer {}", access_token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthHeader(Bearer [REDACTED])")
    }
}

/// Parameters handed to the identity provider at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    /// Identity server base URL (e.g. `https://portal.example.com/auth`)
    pub url: String,
    pub realm: String,
    pub client_id: String,
    /// Where the user agent returns after the provider's login page
    pub redirect_uri: String,
}

/// Session authentication state.
///
/// ```text
/// SignedOut -> SigningIn -> SignedIn
///                             ^  |
///                             |  v
///                          Refreshing
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AuthState {
    #[default]
    SignedOut,
    SigningIn,
    SignedIn,
    Refreshing,
}

impl AuthState {
    /// Whether credentials are usable in this state.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::SignedIn | AuthState::Refreshing)
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthState::SignedOut => write!(f, "Signed Out"),
            AuthState::SigningIn => write!(f, "Signing In"),
            AuthState::SignedIn => write!(f, "Signed In"),
            AuthState::Refreshing => write!(f, "Refreshing Token"),
        }
    }
}
