//! Terminal session handoff.
//!
//! The page that opens a terminal writes a connection descriptor into a
//! short-lived cookie scoped to the terminal page; the terminal page takes it
//! exactly once.

use crate::account::AccountClient;
use crate::error::{Result, ServiceError};
use bridge_traits::storage::CookieStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

pub const HANDOFF_COOKIE: &str = "Guac-Req";
pub const TERMINAL_PATH: &str = "/static/html/terminal.html";
pub const HANDOFF_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    /// Connection protocol; only `ssh` is produced
    #[serde(rename = "type")]
    pub kind: String,
    /// Portal account opening the terminal
    pub account: String,
    /// Login on the target host
    pub username: String,
    pub hostname: String,
    pub hostport: u16,
}

pub struct TerminalHandoff {
    cookies: Arc<dyn CookieStore>,
    account: Arc<AccountClient>,
}

impl TerminalHandoff {
    pub fn new(cookies: Arc<dyn CookieStore>, account: Arc<AccountClient>) -> Self {
        Self { cookies, account }
    }

    /// Publish an SSH descriptor for the terminal page. Returns the
    /// descriptor and the location the host should open.
    #[instrument(skip(self))]
    pub async fn open_ssh(
        &self,
        username: &str,
        hostname: &str,
        hostport: Option<u16>,
    ) -> Result<(ConnectionDescriptor, &'static str)> {
        if username.is_empty() {
            return Err(ServiceError::InvalidInput("username is required".to_string()));
        }
        if hostname.is_empty() {
            return Err(ServiceError::InvalidInput("hostname is required".to_string()));
        }

        let descriptor = ConnectionDescriptor {
            kind: "ssh".to_string(),
            account: self.account.username().await?,
            username: username.to_string(),
            hostname: hostname.to_string(),
            hostport: hostport.unwrap_or(DEFAULT_SSH_PORT),
        };
        let value = serde_json::to_string(&descriptor).map_err(|e| ServiceError::Decode {
            what: "connection descriptor".to_string(),
            message: e.to_string(),
        })?;

        self.cookies
            .set(HANDOFF_COOKIE, &value, HANDOFF_TTL, TERMINAL_PATH)
            .await?;
        info!(hostname, hostport = descriptor.hostport, "Terminal handoff published");
        Ok((descriptor, TERMINAL_PATH))
    }

    /// Read and remove the pending descriptor.
    pub async fn take(&self) -> Result<Option<ConnectionDescriptor>> {
        let Some(value) = self.cookies.get(HANDOFF_COOKIE).await? else {
            debug!("No terminal handoff pending");
            return Ok(None);
        };
        self.cookies.delete(HANDOFF_COOKIE, TERMINAL_PATH).await?;

        let descriptor = serde_json::from_str(&value).map_err(|e| ServiceError::Decode {
            what: "connection descriptor".to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(descriptor))
    }
}

impl std::fmt::Debug for TerminalHandoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalHandoff").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_desktop::MemoryCookieStore;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
    use core_auth::{CredentialStore, Credentials};
    use core_net::RestClient;
    use mockall::mock;

    mock! {
        Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    async fn handoff(cookies: Arc<MemoryCookieStore>) -> TerminalHandoff {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| req.url.ends_with("/userinfo"))
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, r#"{"username":"alice"}"#)));

        let credentials = CredentialStore::new();
        credentials
            .replace(Credentials::new("tok".to_string(), None, None, 600))
            .await;
        let rest = RestClient::new(Arc::new(http), credentials, Duration::from_secs(30));
        let account = Arc::new(AccountClient::new(rest, "https://h/account/v1"));
        TerminalHandoff::new(cookies, account)
    }

    #[tokio::test]
    async fn test_open_then_take_once() {
        let cookies = Arc::new(MemoryCookieStore::new());
        let handoff = handoff(cookies.clone()).await;

        let (descriptor, location) = handoff.open_ssh("root", "10.0.0.5", None).await.unwrap();
        assert_eq!(location, TERMINAL_PATH);
        assert_eq!(descriptor.hostport, 22);
        assert_eq!(descriptor.account, "alice");

        let raw = cookies.get(HANDOFF_COOKIE).await.unwrap().unwrap();
        let wire: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(wire["type"], "ssh");

        assert_eq!(handoff.take().await.unwrap(), Some(descriptor));
        assert_eq!(handoff.take().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_open_requires_host() {
        let mut http = MockHttp::new();
        http.expect_execute().never();
        let rest = RestClient::new(Arc::new(http), CredentialStore::new(), Duration::from_secs(30));
        let handoff = TerminalHandoff::new(
            Arc::new(MemoryCookieStore::new()),
            Arc::new(AccountClient::new(rest, "https://h/account/v1")),
        );

        let result = handoff.open_ssh("root", "", Some(2222)).await;
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
    }
}
