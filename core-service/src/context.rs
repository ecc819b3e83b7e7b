//! Session context: owns every runtime component for one signed-in session.

use crate::account::AccountClient;
use crate::error::Result;
use crate::handoff::TerminalHandoff;
use bridge_traits::{CookieStore, HttpClient, Navigator, WebSocketConnector};
use core_auth::{CredentialStore, IdentityProvider, RefreshDaemon, SessionManager, SessionSettings};
use core_cache::{CacheIndex, CacheRegistry, StoreLocation};
use core_net::{ChannelHandle, ChannelHandlers, ReconnectingChannel, RestClient};
use core_runtime::events::{CoreEvent, EventBus, Receiver};
use core_runtime::{LoginHook, LogoutHook, ReadinessGate, SessionConfig};
use provider_object_store::{AccessKeyClient, BucketClient, ObjectStoreLogin, ObjectTree};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};

/// Host capabilities the context is built from.
#[derive(Clone)]
pub struct HostBridges {
    pub http: Arc<dyn HttpClient>,
    pub sockets: Arc<dyn WebSocketConnector>,
    pub cookies: Arc<dyn CookieStore>,
    pub navigator: Arc<dyn Navigator>,
    pub identity: Arc<dyn IdentityProvider>,
}

/// Primary façade exposed to host applications.
///
/// Construction wires the collaborators together; nothing touches the
/// network or disk until [`login`](Self::login).
///
/// Login sequence: identity provider, object store session, user profile,
/// cache provisioning and stability, then `Ready`.
pub struct SessionContext {
    config: SessionConfig,
    event_bus: EventBus,
    credentials: CredentialStore,
    session: SessionManager,
    rest: RestClient,
    channels: ReconnectingChannel,
    cache: Arc<CacheRegistry>,
    tree: ObjectTree,
    buckets: BucketClient,
    access_keys: AccessKeyClient,
    account: Arc<AccountClient>,
    terminal: TerminalHandoff,
    refresh_daemon: Mutex<Option<RefreshDaemon>>,
}

impl SessionContext {
    pub fn new(config: SessionConfig, bridges: HostBridges) -> Result<Self> {
        config.validate()?;

        let event_bus = EventBus::default();
        let credentials = CredentialStore::new();

        let session = SessionManager::new(
            bridges.identity,
            credentials.clone(),
            bridges.navigator,
            event_bus.clone(),
            SessionSettings::from_config(&config),
        );

        let rest = RestClient::new(bridges.http.clone(), credentials.clone(), config.request_timeout);
        let channels = ReconnectingChannel::new(
            bridges.sockets,
            credentials.clone(),
            config.reconnect.clone(),
            config.connect_timeout,
            event_bus.clone(),
        );

        let location = match &config.cache_dir {
            Some(dir) => StoreLocation::directory(dir.clone()),
            None => StoreLocation::Memory,
        };
        let cache = Arc::new(CacheRegistry::new(
            location,
            CacheIndex::from_config(&config),
            config.stability.clone(),
            event_bus.clone(),
        ));

        let tree = ObjectTree::from_config(rest.clone(), cache.clone(), &config);
        let buckets = BucketClient::from_config(rest.clone(), &config);
        let access_keys = AccessKeyClient::from_config(rest.clone(), &config);
        let account = Arc::new(AccountClient::from_config(rest.clone(), &config));
        let terminal = TerminalHandoff::new(bridges.cookies, account.clone());

        session.register_login_hook(Arc::new(ObjectStoreLogin::from_config(
            bridges.http,
            &config,
        )) as Arc<dyn LoginHook>);
        session.register_login_hook(account.clone() as Arc<dyn LoginHook>);
        session.register_logout_hook(account.clone() as Arc<dyn LogoutHook>);
        session.register_readiness_gate(cache.clone() as Arc<dyn ReadinessGate>);

        info!(endpoint = %config.endpoint, realm = %config.realm, "Session context created");

        Ok(Self {
            config,
            event_bus,
            credentials,
            session,
            rest,
            channels,
            cache,
            tree,
            buckets,
            access_keys,
            account,
            terminal,
            refresh_daemon: Mutex::new(None),
        })
    }

    /// Sign in, wait for readiness and start background token refresh.
    #[instrument(skip(self))]
    pub async fn login(&self, redirect: Option<&str>) -> Result<()> {
        self.session.login(redirect).await?;

        let mut daemon = self.refresh_daemon.lock().await;
        if daemon.is_none() {
            *daemon = Some(self.session.start_refresh_daemon());
        }
        Ok(())
    }

    /// Sign in with the account service's password grant, then run the same
    /// hooks and readiness gates as [`login`](Self::login).
    ///
    /// These tokens are not renewable through the identity provider, so no
    /// refresh daemon is started; sign in again once they expire.
    #[instrument(skip(self, password))]
    pub async fn password_login(&self, username: &str, password: &str) -> Result<()> {
        let credentials = self.account.password_tokens(username, password).await?;
        self.session.login_with(credentials).await?;
        Ok(())
    }

    /// Stop token refresh and end the session. Never fails.
    #[instrument(skip(self))]
    pub async fn logout(&self, redirect: Option<&str>) {
        if let Some(daemon) = self.refresh_daemon.lock().await.take() {
            daemon.stop().await;
        }
        self.session.logout(redirect).await;
    }

    /// Open a reconnecting channel to `path` on the deployment host.
    pub fn open_channel(&self, path: &str, handlers: ChannelHandlers) -> ChannelHandle {
        self.channels.connect(self.config.socket_url(path), handlers)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    pub fn on_ready(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.session.set_on_ready(callback);
    }

    pub async fn is_refreshing(&self) -> bool {
        self.refresh_daemon
            .lock()
            .await
            .as_ref()
            .is_some_and(RefreshDaemon::is_running)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub fn cache(&self) -> &CacheRegistry {
        &self.cache
    }

    pub fn tree(&self) -> &ObjectTree {
        &self.tree
    }

    pub fn buckets(&self) -> &BucketClient {
        &self.buckets
    }

    pub fn access_keys(&self) -> &AccessKeyClient {
        &self.access_keys
    }

    pub fn account(&self) -> &AccountClient {
        &self.account
    }

    pub fn terminal(&self) -> &TerminalHandoff {
        &self.terminal
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("endpoint", &self.config.endpoint)
            .field("realm", &self.config.realm)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "desktop-shims")]
mod desktop {
    use super::*;
    use crate::error::ServiceError;
    use bridge_desktop::{
        default_cache_dir, MemoryCookieStore, ReqwestHttpClient, TracingNavigator,
        TungsteniteConnector,
    };
    use core_auth::{AuthorizationCallback, KeycloakProvider};

    impl SessionContext {
        /// Context backed by the desktop bridges and a Keycloak provider.
        ///
        /// The cache lives under the platform cache directory unless the
        /// configuration names one.
        pub fn desktop(
            mut config: SessionConfig,
            callback: Arc<dyn AuthorizationCallback>,
        ) -> Result<Self> {
            let http: Arc<dyn HttpClient> = Arc::new(
                ReqwestHttpClient::new(config.request_timeout)
                    .map_err(|e| ServiceError::InitializationFailed(e.to_string()))?,
            );
            if config.cache_dir.is_none() {
                config.cache_dir = Some(default_cache_dir());
            }

            let bridges = HostBridges {
                identity: Arc::new(KeycloakProvider::new(http.clone(), callback)),
                http,
                sockets: Arc::new(TungsteniteConnector::new(config.connect_timeout)),
                cookies: Arc::new(MemoryCookieStore::new()),
                navigator: Arc::new(TracingNavigator::new()),
            };
            Self::new(config, bridges)
        }
    }
}
