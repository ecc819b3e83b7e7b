//! Keycloak (OpenID Connect) identity provider.
//!
//! Implements the authorization-code flow with PKCE (RFC 7636) against a
//! realm's `openid-connect` endpoints, the refresh-token grant and the
//! end-session call. The browser leg is delegated to an
//! [`AuthorizationCallback`].
//!
//! Tokens, codes and verifiers are never logged.

use crate::error::{AuthError, Result};
use crate::provider::{AuthorizationCallback, IdentityProvider};
use crate::types::{Credentials, IdentityConfig};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bytes::Bytes;
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use url::Url;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// PKCE code verifier plus the CSRF `state` value for one authorization.
#[derive(Clone)]
pub struct PkceVerifier {
    verifier: String,
    state: String,
}

impl PkceVerifier {
    /// 32 random bytes for the verifier, 16 for the state, both base64url.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();

        let mut verifier_bytes = [0u8; 32];
        rng.fill(&mut verifier_bytes);

        let mut state_bytes = [0u8; 16];
        rng.fill(&mut state_bytes);

        Self {
            verifier: URL_SAFE_NO_PAD.encode(verifier_bytes),
            state: URL_SAFE_NO_PAD.encode(state_bytes),
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// S256 challenge: `BASE64URL(SHA256(verifier))`.
    pub fn challenge(&self) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(self.verifier.as_bytes()))
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceVerifier")
            .field("verifier", &"[REDACTED]")
            .field("state", &self.state)
            .finish()
    }
}

/// Realm endpoints derived from an [`IdentityConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealmEndpoints {
    pub authorize: String,
    pub token: String,
    pub logout: String,
    pub client_id: String,
    pub redirect_uri: String,
}

impl RealmEndpoints {
    pub fn from_config(config: &IdentityConfig) -> Self {
        let base = format!(
            "{}/realms/{}/protocol/openid-connect",
            config.url.trim_end_matches('/'),
            config.realm
        );
        Self {
            authorize: format!("{}/auth", base),
            token: format!("{}/token", base),
            logout: format!("{}/logout", base),
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
        }
    }
}

/// OpenID Connect provider for a Keycloak realm.
pub struct KeycloakProvider {
    http_client: Arc<dyn HttpClient>,
    callback: Arc<dyn AuthorizationCallback>,
    endpoints: RwLock<Option<RealmEndpoints>>,
}

impl KeycloakProvider {
    pub fn new(http_client: Arc<dyn HttpClient>, callback: Arc<dyn AuthorizationCallback>) -> Self {
        Self {
            http_client,
            callback,
            endpoints: RwLock::new(None),
        }
    }

    /// Authorization URL carrying the PKCE challenge.
    ///
    /// # Errors
    ///
    /// `AuthError::InvalidState` if the authorize endpoint is not a valid URL.
    pub fn build_auth_url(
        &self,
        endpoints: &RealmEndpoints,
        verifier: &PkceVerifier,
    ) -> Result<String> {
        let mut url = Url::parse(&endpoints.authorize)
            .map_err(|e| AuthError::InvalidState(format!("Invalid authorize URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", endpoints.client_id.as_str())
            .append_pair("redirect_uri", endpoints.redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", "openid")
            .append_pair("state", verifier.state())
            .append_pair("code_challenge", &verifier.challenge())
            .append_pair("code_challenge_method", "S256");

        Ok(url.to_string())
    }

    async fn current_endpoints(&self) -> Result<RealmEndpoints> {
        self.endpoints
            .read()
            .await
            .clone()
            .ok_or_else(|| AuthError::InvalidState("Provider was not initialized".to_string()))
    }

    async fn post_form(&self, url: &str, params: &[(&str, &str)]) -> Result<HttpResponse> {
        let encoded = serde_urlencoded::to_string(params)
            .map_err(|e| AuthError::InvalidState(format!("Failed to encode form: {}", e)))?;

        let request = HttpRequest::new(HttpMethod::Post, url)
            .header("Content-Type", FORM_CONTENT_TYPE)
            .body(Bytes::from(encoded));

        self.http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::Network(e.to_string()))
    }

    async fn exchange_code(
        &self,
        endpoints: &RealmEndpoints,
        code: &str,
        verifier: &PkceVerifier,
    ) -> Result<Credentials> {
        let response = self
            .post_form(
                &endpoints.token,
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", endpoints.redirect_uri.as_str()),
                    ("client_id", endpoints.client_id.as_str()),
                    ("code_verifier", verifier.verifier()),
                ],
            )
            .await?;

        if !response.is_success() {
            let body = error_body(&response);
            warn!(status = response.status, error = %body, "Authorization code exchange rejected");
            return Err(AuthError::AuthFailure(format!(
                "Token endpoint returned {}: {}",
                response.status, body
            )));
        }

        let tokens: TokenResponse = response
            .json()
            .map_err(|e| AuthError::Parse(e.to_string()))?;
        Ok(tokens.into_credentials(None))
    }
}

#[async_trait]
impl IdentityProvider for KeycloakProvider {
    #[instrument(skip(self, config), fields(realm = %config.realm, client_id = %config.client_id))]
    async fn init(&self, config: &IdentityConfig) -> Result<Credentials> {
        let endpoints = RealmEndpoints::from_config(config);
        let verifier = PkceVerifier::new();
        let auth_url = self.build_auth_url(&endpoints, &verifier)?;

        debug!("Awaiting authorization callback");
        let response = self.callback.authorize(&auth_url).await?;

        if response.state != verifier.state() {
            warn!("Authorization state mismatch");
            return Err(AuthError::StateMismatch {
                expected: verifier.state().to_string(),
                actual: response.state,
            });
        }

        let credentials = self
            .exchange_code(&endpoints, &response.code, &verifier)
            .await?;
        *self.endpoints.write().await = Some(endpoints);

        info!(expires_at = %credentials.expires_at, "Signed in with Keycloak");
        Ok(credentials)
    }

    #[instrument(skip(self, current))]
    async fn update_token(
        &self,
        current: &Credentials,
        min_validity: Duration,
    ) -> Result<Option<Credentials>> {
        if !current.expires_within(min_validity) {
            return Ok(None);
        }

        let endpoints = self.current_endpoints().await?;
        let refresh_token = current
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::RefreshFailure("No refresh token available".to_string()))?;

        let response = self
            .post_form(
                &endpoints.token,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", endpoints.client_id.as_str()),
                ],
            )
            .await
            .map_err(AuthError::into_refresh_failure)?;

        if !response.is_success() {
            let body = error_body(&response);
            warn!(status = response.status, error = %body, "Refresh grant rejected");
            return Err(AuthError::RefreshFailure(format!(
                "Token endpoint returned {}: {}",
                response.status, body
            )));
        }

        let tokens: TokenResponse = response
            .json()
            .map_err(|e| AuthError::RefreshFailure(e.to_string()))?;

        debug!(expires_in = tokens.expires_in, "Access token renewed");
        Ok(Some(tokens.into_credentials(Some(current))))
    }

    #[instrument(skip(self, current))]
    async fn logout(&self, current: Option<&Credentials>, redirect_uri: &str) -> Result<()> {
        let endpoints = self.current_endpoints().await?;

        let mut params = vec![("client_id", endpoints.client_id.as_str())];
        if let Some(refresh_token) = current.and_then(|c| c.refresh_token.as_deref()) {
            params.push(("refresh_token", refresh_token));
        }
        if !redirect_uri.is_empty() {
            params.push(("post_logout_redirect_uri", redirect_uri));
        }

        let response = self.post_form(&endpoints.logout, &params).await?;
        if !response.is_success() {
            return Err(AuthError::AuthFailure(format!(
                "Logout endpoint returned {}: {}",
                response.status,
                error_body(&response)
            )));
        }

        *self.endpoints.write().await = None;
        Ok(())
    }
}

fn error_body(response: &HttpResponse) -> String {
    response
        .text()
        .unwrap_or_else(|_| "Unable to read error response".to_string())
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    id_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

impl TokenResponse {
    /// Fields the server omitted are carried over from `previous`.
    fn into_credentials(self, previous: Option<&Credentials>) -> Credentials {
        let refresh_token = self
            .refresh_token
            .or_else(|| previous.and_then(|p| p.refresh_token.clone()));
        let id_token = self
            .id_token
            .or_else(|| previous.and_then(|p| p.id_token.clone()));
        Credentials::new(self.access_token, refresh_token, id_token, self.expires_in)
    }
}

fn default_expires_in() -> i64 {
    300
}
