use async_trait::async_trait;
use bridge_desktop::{MemoryCookieStore, TracingNavigator, TungsteniteConnector};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use core_auth::{Credentials, IdentityConfig, IdentityProvider};
use core_runtime::events::{CacheEvent, CoreEvent, Receiver, SessionEvent};
use core_runtime::SessionConfig;
use core_service::{HostBridges, ServiceError, SessionContext};
use mockall::mock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

mock! {
    Http {}

    #[async_trait]
    impl HttpClient for Http {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
    }
}

#[derive(Default)]
struct StaticProvider {
    logouts: AtomicUsize,
}

#[async_trait]
impl IdentityProvider for StaticProvider {
    async fn init(&self, _config: &IdentityConfig) -> core_auth::Result<Credentials> {
        Ok(Credentials::new(
            "access".to_string(),
            Some("refresh".to_string()),
            None,
            600,
        ))
    }

    async fn update_token(
        &self,
        _current: &Credentials,
        _min_validity: Duration,
    ) -> core_auth::Result<Option<Credentials>> {
        Ok(None)
    }

    async fn logout(&self, _current: Option<&Credentials>, _redirect: &str) -> core_auth::Result<()> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Answers the object store handshake and the profile lookup.
fn portal(console_status: u16) -> MockHttp {
    let mut http = MockHttp::new();
    http.expect_execute().returning(move |req| {
        let url = req.url.as_str();
        let response = if url.ends_with("/minio/api/v1/login") && req.method == HttpMethod::Get {
            HttpResponse::new(
                console_status,
                r#"{"redirectRules":[{"redirect":"https://portal.example.com/auth/console"}]}"#,
            )
        } else if url.ends_with("/auth/console") {
            HttpResponse::new(200, r#"{"code":"c-1","state":"s-1"}"#)
        } else if url.ends_with("/login/oauth2/auth") {
            HttpResponse::new(204, "")
        } else if url.ends_with("/account/v1/login") && req.method == HttpMethod::Post {
            HttpResponse::new(200, r#"{"access_token":"pw-access","refresh_token":"pw-refresh"}"#)
        } else if url.ends_with("/userinfo") {
            HttpResponse::new(200, r#"{"username":"alice"}"#)
        } else {
            HttpResponse::new(404, "")
        };
        Ok(response)
    });
    http
}

fn config() -> SessionConfig {
    SessionConfig::builder()
        .endpoint("portal.example.com")
        .realm("acme")
        .client_id("console")
        .cache_table("Session", "tabs")
        .build()
        .unwrap()
}

fn context(
    http: MockHttp,
    provider: Arc<StaticProvider>,
    navigator: Arc<TracingNavigator>,
) -> SessionContext {
    let bridges = HostBridges {
        http: Arc::new(http),
        sockets: Arc::new(TungsteniteConnector::new(Duration::from_secs(1))),
        cookies: Arc::new(MemoryCookieStore::new()),
        navigator,
        identity: provider,
    };
    SessionContext::new(config(), bridges).unwrap()
}

fn drain(events: &mut Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

#[tokio::test]
async fn test_login_reaches_ready_and_logout_clears() {
    let provider = Arc::new(StaticProvider::default());
    let navigator = Arc::new(TracingNavigator::new());
    let context = context(portal(200), provider.clone(), navigator.clone());
    let mut events = context.subscribe();

    context.login(None).await.unwrap();

    let seen = drain(&mut events);
    assert!(seen.contains(&CoreEvent::Session(SessionEvent::Ready)));
    assert!(seen.contains(&CoreEvent::Cache(CacheEvent::Stable)));
    assert!(!seen
        .iter()
        .any(|e| matches!(e, CoreEvent::Session(SessionEvent::AuthFailed { .. }))));

    assert!(context.credentials().is_signed_in().await);
    assert!(context.is_refreshing().await);
    assert_eq!(
        context.account().cached_user_info().await.unwrap().username,
        "alice"
    );
    assert!(context.cache().table("Blob", "index").await.is_some());
    assert!(context.cache().table("Session", "tabs").await.is_some());

    let (descriptor, _) = context
        .terminal()
        .open_ssh("root", "10.0.0.5", None)
        .await
        .unwrap();
    assert_eq!(descriptor.account, "alice");

    context.logout(None).await;

    assert!(!context.credentials().is_signed_in().await);
    assert!(!context.is_refreshing().await);
    assert!(context.account().cached_user_info().await.is_none());
    assert_eq!(provider.logouts.load(Ordering::SeqCst), 1);
    assert_eq!(navigator.last_location().as_deref(), Some("/"));
}

#[tokio::test]
async fn test_password_login_runs_login_sequence() {
    let context = context(
        portal(200),
        Arc::new(StaticProvider::default()),
        Arc::new(TracingNavigator::new()),
    );
    let mut events = context.subscribe();

    context.password_login("alice", "pw").await.unwrap();

    let seen = drain(&mut events);
    assert!(seen.contains(&CoreEvent::Session(SessionEvent::SignedIn)));
    assert!(seen.contains(&CoreEvent::Session(SessionEvent::Ready)));
    assert!(seen.contains(&CoreEvent::Cache(CacheEvent::Stable)));
    assert_eq!(context.credentials().access_token().await.unwrap(), "pw-access");
    assert_eq!(
        context.account().cached_user_info().await.unwrap().username,
        "alice"
    );
    assert!(!context.is_refreshing().await);

    context.logout(None).await;
    assert!(!context.credentials().is_signed_in().await);
}

#[tokio::test]
async fn test_object_store_failure_does_not_block_ready() {
    let context = context(
        portal(500),
        Arc::new(StaticProvider::default()),
        Arc::new(TracingNavigator::new()),
    );
    let mut events = context.subscribe();

    context.login(None).await.unwrap();

    let seen = drain(&mut events);
    assert!(seen.contains(&CoreEvent::Session(SessionEvent::Ready)));
    assert!(seen.iter().any(|e| matches!(
        e,
        CoreEvent::Session(SessionEvent::AuthFailed { fatal: false, message })
            if message.starts_with("object-store")
    )));

    context.logout(None).await;
}

#[tokio::test]
async fn test_rejects_invalid_config() {
    let mut config = config();
    config.endpoint = "https://portal.example.com".to_string();

    let bridges = HostBridges {
        http: Arc::new(MockHttp::new()),
        sockets: Arc::new(TungsteniteConnector::new(Duration::from_secs(1))),
        cookies: Arc::new(MemoryCookieStore::new()),
        navigator: Arc::new(TracingNavigator::new()),
        identity: Arc::new(StaticProvider::default()),
    };

    let result = SessionContext::new(config, bridges);
    assert!(matches!(result, Err(ServiceError::Config(_))));
}
