//! Authenticated JSON request client.
//!
//! Every call reads the credential store when it is made and sends
//! `Authorization: Bearer <token>` plus JSON `Content-Type`/`Accept`
//! headers. Non-2xx answers become [`RequestError::Status`] carrying the raw
//! response. There are no retries at this layer.

use crate::error::{RequestError, Result};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use core_auth::{AuthHeader, CredentialStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Clone)]
pub struct RestClient {
    http: Arc<dyn HttpClient>,
    credentials: CredentialStore,
    timeout: Duration,
}

impl RestClient {
    pub fn new(http: Arc<dyn HttpClient>, credentials: CredentialStore, timeout: Duration) -> Self {
        Self {
            http,
            credentials,
            timeout,
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn http_client(&self) -> &Arc<dyn HttpClient> {
        &self.http
    }

    /// Send a JSON request and decode the JSON answer.
    ///
    /// An empty 2xx body decodes to `Value::Null`.
    ///
    /// # Errors
    ///
    /// - `RequestError::Auth` when no session is active
    /// - `RequestError::Status` for a non-2xx answer
    /// - `RequestError::Bridge` when the exchange itself fails
    #[instrument(skip(self, body), fields(method = %method))]
    pub async fn request<B: Serialize + Sync>(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<&B>,
    ) -> Result<Value> {
        let mut request = HttpRequest::new(method, url)
            .header("Content-Type", JSON_CONTENT_TYPE)
            .header("Accept", JSON_CONTENT_TYPE);
        if let Some(body) = body {
            request = request.json(body)?;
        }

        let response = self.send(request).await?;
        decode_body(&response)
    }

    /// Attach the bearer header and timeout, execute, and reject non-2xx.
    ///
    /// Used directly for bodies that are not JSON (multipart, downloads).
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let header = self.credentials.auth_header().await?;
        let request = request
            .header(AuthHeader::NAME, header.as_str())
            .timeout(self.timeout);

        let method = request.method;
        let url = request.url.clone();
        let response = self.http.execute(request).await?;

        if !response.is_success() {
            warn!(%method, %url, status = response.status, "Request rejected");
            return Err(RequestError::Status {
                status: response.status,
                response,
            });
        }

        debug!(%method, %url, status = response.status, bytes = response.body.len(), "Request completed");
        Ok(response)
    }

    pub async fn get(&self, url: &str) -> Result<Value> {
        self.request::<Value>(HttpMethod::Get, url, None).await
    }

    pub async fn post<B: Serialize + Sync>(&self, url: &str, body: &B) -> Result<Value> {
        self.request(HttpMethod::Post, url, Some(body)).await
    }

    pub async fn put<B: Serialize + Sync>(&self, url: &str, body: &B) -> Result<Value> {
        self.request(HttpMethod::Put, url, Some(body)).await
    }

    pub async fn patch<B: Serialize + Sync>(&self, url: &str, body: &B) -> Result<Value> {
        self.request(HttpMethod::Patch, url, Some(body)).await
    }

    pub async fn delete(&self, url: &str) -> Result<Value> {
        self.request::<Value>(HttpMethod::Delete, url, None).await
    }

    /// `GET` and deserialize into `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let value = self.get(url).await?;
        serde_json::from_value(value).map_err(|e| RequestError::Decode(e.to_string()))
    }

    /// Send `body` with `method` and deserialize the answer into `T`.
    pub async fn send_json<B, T>(&self, method: HttpMethod, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let value = self.request(method, url, Some(body)).await?;
        serde_json::from_value(value).map_err(|e| RequestError::Decode(e.to_string()))
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn decode_body(response: &HttpResponse) -> Result<Value> {
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&response.body).map_err(|e| RequestError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use core_auth::Credentials;
    use mockall::mock;
    use serde::Deserialize;
    use serde_json::json;

    mock! {
        Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    async fn signed_in(token: &str) -> CredentialStore {
        let store = CredentialStore::new();
        store
            .replace(Credentials::new(token.to_string(), None, None, 600))
            .await;
        store
    }

    fn client(http: MockHttp, store: CredentialStore) -> RestClient {
        RestClient::new(Arc::new(http), store, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_request_attaches_headers() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| {
                req.method == HttpMethod::Post
                    && req.headers.get("Authorization").map(String::as_str) == Some("Bearer tok")
                    && req.headers.get("Content-Type").map(String::as_str)
                        == Some(JSON_CONTENT_TYPE)
                    && req.headers.get("Accept").map(String::as_str) == Some(JSON_CONTENT_TYPE)
                    && req.timeout == Some(Duration::from_secs(30))
                    && req.body_bytes().map(|b| &b[..]) == Some(&br#"{"name":"x"}"#[..])
            })
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, r#"{"id":1}"#)));

        let client = client(http, signed_in("tok").await);
        let value = client.post("https://h/x", &json!({"name": "x"})).await.unwrap();

        assert_eq!(value, json!({"id": 1}));
    }

    #[tokio::test]
    async fn test_header_follows_credential_refresh() {
        let store = signed_in("old").await;
        let mut http = MockHttp::new();
        let mut seq = mockall::Sequence::new();
        http.expect_execute()
            .withf(|req| req.headers.get("Authorization").map(String::as_str) == Some("Bearer old"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(HttpResponse::new(200, "{}")));
        http.expect_execute()
            .withf(|req| req.headers.get("Authorization").map(String::as_str) == Some("Bearer new"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(HttpResponse::new(200, "{}")));

        let client = client(http, store.clone());
        client.get("https://h/a").await.unwrap();
        store
            .replace(Credentials::new("new".to_string(), None, None, 600))
            .await;
        client.get("https://h/a").await.unwrap();
    }

    #[tokio::test]
    async fn test_non_success_carries_response() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .returning(|_| Ok(HttpResponse::new(404, r#"{"message":"no bucket"}"#)));

        let client = client(http, signed_in("tok").await);
        let err = client.delete("https://h/b").await.unwrap_err();

        assert_eq!(err.status(), Some(404));
        match err {
            RequestError::Status { response, .. } => {
                assert_eq!(response.text().unwrap(), r#"{"message":"no bucket"}"#)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_body_is_null() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .returning(|_| Ok(HttpResponse::new(204, "")));

        let client = client(http, signed_in("tok").await);
        assert_eq!(client.put("https://h/x", &json!({})).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_requires_session() {
        let mut http = MockHttp::new();
        http.expect_execute().never();

        let client = client(http, CredentialStore::new());
        let err = client.get("https://h/x").await.unwrap_err();
        assert!(matches!(err, RequestError::Auth(_)));
    }

    #[tokio::test]
    async fn test_bridge_failure_is_not_retried() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Err(BridgeError::Timeout("30s".to_string())));

        let client = client(http, signed_in("tok").await);
        let err = client.get("https://h/x").await.unwrap_err();
        assert!(matches!(err, RequestError::Bridge(BridgeError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_get_json() {
        #[derive(Deserialize)]
        struct Info {
            name: String,
        }

        let mut http = MockHttp::new();
        http.expect_execute()
            .returning(|_| Ok(HttpResponse::new(200, r#"{"name":"alice","extra":true}"#)));

        let client = client(http, signed_in("tok").await);
        let info: Info = client.get_json("https://h/me").await.unwrap();
        assert_eq!(info.name, "alice");

        let err = client.get_json::<Vec<u8>>("https://h/me").await;
        assert!(err.is_err());
    }
}
