//! Object store console login.
//!
//! The object endpoint keeps its own cookie session. It is established once
//! per login by replaying the console's OAuth redirect through the host
//! HTTP client, whose cookie jar then carries it on every object request.

use crate::error::{Result, TreeError};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use core_runtime::{LoginHook, SessionConfig};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRules {
    #[serde(default)]
    redirect_rules: Vec<RedirectRule>,
}

#[derive(Debug, Deserialize)]
struct RedirectRule {
    redirect: String,
}

/// [`LoginHook`] that opens the object store session after sign-in.
pub struct ObjectStoreLogin {
    http: Arc<dyn HttpClient>,
    object_url: String,
    timeout: Duration,
}

impl ObjectStoreLogin {
    pub fn new(http: Arc<dyn HttpClient>, object_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            object_url: object_url.into(),
            timeout,
        }
    }

    pub fn from_config(http: Arc<dyn HttpClient>, config: &SessionConfig) -> Self {
        Self::new(http, config.object_url(), config.request_timeout)
    }

    async fn exchange(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = request.url.clone();
        let response = self.http.execute(request.timeout(self.timeout)).await?;
        if !response.is_success() {
            return Err(TreeError::Decode(format!(
                "{} answered {}",
                url, response.status
            )));
        }
        Ok(response)
    }

    fn decode<T: serde::de::DeserializeOwned>(response: &HttpResponse, what: &str) -> Result<T> {
        serde_json::from_slice(&response.body)
            .map_err(|e| TreeError::Decode(format!("{}: {}", what, e)))
    }

    /// Run the three-step console handshake.
    #[instrument(skip(self), fields(object_url = %self.object_url))]
    pub async fn establish(&self) -> Result<()> {
        let rules: LoginRules = Self::decode(
            &self
                .exchange(HttpRequest::new(
                    HttpMethod::Get,
                    format!("{}/login", self.object_url),
                ))
                .await?,
            "login rules",
        )?;
        let redirect = rules
            .redirect_rules
            .into_iter()
            .next()
            .map(|rule| rule.redirect)
            .ok_or_else(|| TreeError::Decode("login rules carry no redirect".to_string()))?;
        debug!(redirect = %redirect, "Following console redirect");

        let mut grant: Value = Self::decode(
            &self
                .exchange(HttpRequest::new(HttpMethod::Get, redirect))
                .await?,
            "authorization grant",
        )?;

        if let Some(state) = grant.get("state").and_then(Value::as_str) {
            let decoded = urlencoding::decode(state)
                .map_err(|e| TreeError::Decode(format!("state: {}", e)))?
                .into_owned();
            grant["state"] = Value::String(decoded);
        }

        let request = HttpRequest::new(
            HttpMethod::Post,
            format!("{}/login/oauth2/auth", self.object_url),
        )
        .json(&grant)?;
        self.exchange(request).await?;

        info!("Object store session established");
        Ok(())
    }
}

#[async_trait]
impl LoginHook for ObjectStoreLogin {
    fn name(&self) -> &str {
        "object-store"
    }

    async fn on_login(&self) -> anyhow::Result<()> {
        self.establish().await?;
        Ok(())
    }
}

impl std::fmt::Debug for ObjectStoreLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreLogin")
            .field("object_url", &self.object_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
