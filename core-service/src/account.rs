//! Account service client.
//!
//! Signed-in user profile, password management and the password-grant
//! login used by hosts that cannot run the browser flow.

use crate::error::{Result, ServiceError};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use core_auth::{CredentialStore, Credentials};
use core_net::rest::JSON_CONTENT_TYPE;
use core_net::RestClient;
use core_runtime::{LoginHook, LogoutHook, SessionConfig};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

/// Access token lifetime assumed when the login answer omits `expires_in`
const DEFAULT_EXPIRES_IN: i64 = 300;

/// Profile of the signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct PasswordTokens {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

pub struct AccountClient {
    rest: RestClient,
    http: Arc<dyn HttpClient>,
    account_url: String,
    user_info: RwLock<Option<UserInfo>>,
}

impl AccountClient {
    pub fn new(rest: RestClient, account_url: impl Into<String>) -> Self {
        Self {
            http: rest.http_client().clone(),
            rest,
            account_url: account_url.into(),
            user_info: RwLock::new(None),
        }
    }

    pub fn from_config(rest: RestClient, config: &SessionConfig) -> Self {
        Self::new(rest, config.account_url())
    }

    fn credentials(&self) -> &CredentialStore {
        self.rest.credentials()
    }

    /// Fetch the profile and keep it for later calls.
    pub async fn user_info(&self) -> Result<UserInfo> {
        let url = format!("{}/userinfo", self.account_url);
        let info: UserInfo = self.rest.get_json(&url).await?;
        *self.user_info.write().await = Some(info.clone());
        Ok(info)
    }

    /// Profile from the last successful [`user_info`](Self::user_info) call.
    pub async fn cached_user_info(&self) -> Option<UserInfo> {
        self.user_info.read().await.clone()
    }

    /// Username of the signed-in account, fetching the profile if needed.
    pub async fn username(&self) -> Result<String> {
        if let Some(info) = self.cached_user_info().await {
            return Ok(info.username);
        }
        Ok(self.user_info().await?.username)
    }

    pub async fn auth_info(&self) -> Result<Value> {
        let url = format!("{}/authinfo", self.account_url);
        Ok(self.rest.get(&url).await?)
    }

    #[instrument(skip(self, password))]
    pub async fn change_password(&self, password: &str) -> Result<Value> {
        if password.is_empty() {
            return Err(ServiceError::InvalidInput("password is required".to_string()));
        }
        let username = self.username().await?;
        let url = format!("{}/password", self.account_url);
        let body = json!({ "username": username, "password": password });
        Ok(self.rest.post(&url, &body).await?)
    }

    /// Exchange a username and password for tokens without touching the
    /// credential store.
    #[instrument(skip(self, password))]
    pub async fn password_tokens(&self, username: &str, password: &str) -> Result<Credentials> {
        if username.is_empty() || password.is_empty() {
            return Err(ServiceError::InvalidInput(
                "username and password are required".to_string(),
            ));
        }

        let request = HttpRequest::new(HttpMethod::Post, format!("{}/login", self.account_url))
            .header("Content-Type", JSON_CONTENT_TYPE)
            .header("Accept", JSON_CONTENT_TYPE)
            .json(&json!({ "username": username, "password": password }))?;
        let response = self.http.execute(request).await?;
        if !response.is_success() {
            return Err(core_auth::AuthError::AuthFailure(format!(
                "password login answered {}",
                response.status
            ))
            .into());
        }

        let tokens: PasswordTokens =
            serde_json::from_slice(&response.body).map_err(|e| ServiceError::Decode {
                what: "login tokens".to_string(),
                message: e.to_string(),
            })?;
        Ok(Credentials::new(
            tokens.access_token,
            tokens.refresh_token,
            None,
            tokens.expires_in.unwrap_or(DEFAULT_EXPIRES_IN),
        ))
    }

    /// Headless sign-in: install password-grant tokens in the credential
    /// store and nothing more.
    ///
    /// No session events are emitted and no login hooks, readiness gates or
    /// token refresh run. Hosts wanting the full login sequence call
    /// `SessionContext::password_login` instead.
    pub async fn password_login(&self, username: &str, password: &str) -> Result<()> {
        let credentials = self.password_tokens(username, password).await?;
        self.credentials().replace(credentials).await;
        info!("Signed in with password");
        Ok(())
    }

    /// Revoke the refresh token and clear the credential store. The store is
    /// left untouched if the service rejects the call.
    #[instrument(skip(self))]
    pub async fn password_logout(&self) -> Result<()> {
        let refresh_token = self
            .credentials()
            .snapshot()
            .await
            .and_then(|c| c.refresh_token)
            .unwrap_or_default();
        let url = format!(
            "{}/logout?refreshToken={}",
            self.account_url,
            urlencoding::encode(&refresh_token)
        );
        self.rest.get(&url).await?;

        self.credentials().clear().await;
        self.forget().await;
        info!("Signed out");
        Ok(())
    }

    pub async fn forget(&self) {
        *self.user_info.write().await = None;
    }
}

#[async_trait]
impl LoginHook for AccountClient {
    fn name(&self) -> &str {
        "account"
    }

    async fn on_login(&self) -> anyhow::Result<()> {
        let info = self.user_info().await?;
        info!(username = %info.username, "Loaded user info");
        Ok(())
    }
}

#[async_trait]
impl LogoutHook for AccountClient {
    fn name(&self) -> &str {
        "account"
    }

    async fn on_logout(&self) -> anyhow::Result<()> {
        self.forget().await;
        Ok(())
    }
}

impl std::fmt::Debug for AccountClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountClient")
            .field("account_url", &self.account_url)
            .finish_non_exhaustive()
    }
}
