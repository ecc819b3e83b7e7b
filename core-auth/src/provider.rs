//! Identity provider seam.
//!
//! The session manager never speaks an authentication protocol itself. It
//! drives an [`IdentityProvider`], which hosts implement or take from
//! [`KeycloakProvider`](crate::keycloak::KeycloakProvider).

use crate::error::Result;
use crate::types::{Credentials, IdentityConfig};
use async_trait::async_trait;
use std::time::Duration;

/// Pluggable login protocol.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authenticate the user and return a fresh token set.
    async fn init(&self, config: &IdentityConfig) -> Result<Credentials>;

    /// Renew `current` if it expires within `min_validity`.
    ///
    /// Returns `Ok(None)` when the token is still valid and nothing changed.
    async fn update_token(
        &self,
        current: &Credentials,
        min_validity: Duration,
    ) -> Result<Option<Credentials>>;

    /// End the session at the provider.
    async fn logout(&self, current: Option<&Credentials>, redirect_uri: &str) -> Result<()>;
}

/// Authorization code returned to the redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    pub code: String,
    pub state: String,
}

/// Performs the user-agent leg of an authorization-code flow.
///
/// The host opens `authorization_url` (browser, embedded view, test double)
/// and resolves once the provider redirects back with a code.
#[async_trait]
pub trait AuthorizationCallback: Send + Sync {
    async fn authorize(&self, authorization_url: &str) -> Result<AuthorizationResponse>;
}
