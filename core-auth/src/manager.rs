//! # Session Manager
//!
//! Drives the login, refresh and logout lifecycle for the single active
//! session.
//!
//! ## Login sequence
//!
//! ```text
//! SigningIn ─> IdentityProvider::init ─> CredentialStore::replace ─> SignedIn
//!          ─> LoginHook* (in order) ─> ReadinessGate* ─> Ready ─> on_ready()
//! ```
//!
//! Identity failures (including the `auth_timeout` elapsing) are fatal: a
//! fatal `AuthFailed` event is emitted, the navigator is sent to the
//! redirect target and `AuthError::AuthFailure` is returned. Login hook
//! failures are reported but do not abort. A failing readiness gate ends
//! the login with `AuthError::NotReady` and no `Ready` signal.
//!
//! ## Refresh
//!
//! [`SessionManager::start_refresh_daemon`] spawns a task that asks the
//! provider to renew the token every `refresh_interval`. Renewals replace the
//! shared credentials in place, so every component sees the new header on
//! its next request.

use crate::credentials::CredentialStore;
use crate::error::{AuthError, Result};
use crate::provider::IdentityProvider;
use crate::types::{AuthState, Credentials, IdentityConfig};
use bridge_traits::Navigator;
use core_runtime::events::{CoreEvent, EventBus, SessionEvent};
use core_runtime::lifecycle::{LoginHook, LogoutHook, ReadinessGate};
use core_runtime::SessionConfig;
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

type ReadyCallback = Arc<dyn Fn() + Send + Sync>;

/// Timing and identity parameters the manager needs from the session config.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub identity: IdentityConfig,
    pub refresh_interval: Duration,
    pub token_min_validity: Duration,
    pub auth_timeout: Duration,
    /// Redirect target when the caller supplies none
    pub fallback_redirect: String,
}

impl SessionSettings {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            identity: IdentityConfig {
                url: config.auth_url(),
                realm: config.realm.clone(),
                client_id: config.client_id.clone(),
                redirect_uri: format!("{}/", config.base_url()),
            },
            refresh_interval: config.refresh_interval,
            token_min_validity: config.token_min_validity,
            auth_timeout: config.auth_timeout,
            fallback_redirect: config.fallback_redirect.clone(),
        }
    }
}

/// State shared between the manager and its refresh daemon.
#[derive(Clone)]
struct Refresher {
    provider: Arc<dyn IdentityProvider>,
    credentials: CredentialStore,
    event_bus: EventBus,
    state: Arc<RwLock<AuthState>>,
    min_validity: Duration,
}

impl Refresher {
    async fn refresh(&self) -> Result<bool> {
        let current = self
            .credentials
            .snapshot()
            .await
            .ok_or(AuthError::NotAuthenticated)?;

        *self.state.write().await = AuthState::Refreshing;
        let outcome = self
            .provider
            .update_token(&current, self.min_validity)
            .await;
        let mut state = self.state.write().await;
        if *state == AuthState::Refreshing {
            *state = AuthState::SignedIn;
        }
        drop(state);

        match outcome {
            Ok(Some(renewed)) => {
                let expires_at = renewed.expires_at.timestamp();
                // A logout that raced the renewal wins.
                if !self.credentials.replace_if_signed_in(renewed).await {
                    debug!("Discarding renewed token after sign-out");
                    return Ok(false);
                }
                info!(expires_at, "Access token refreshed");
                self.event_bus
                    .emit(CoreEvent::Session(SessionEvent::TokenRefreshed { expires_at }))
                    .ok();
                Ok(true)
            }
            Ok(None) => {
                debug!("Access token still valid");
                Ok(false)
            }
            Err(e) => {
                let e = e.into_refresh_failure();
                warn!(error = %e, "Token refresh failed; retrying on next tick");
                self.event_bus
                    .emit(CoreEvent::Session(SessionEvent::RefreshFailed {
                        message: e.to_string(),
                    }))
                    .ok();
                Err(e)
            }
        }
    }
}

/// Orchestrates the session lifecycle.
pub struct SessionManager {
    refresher: Refresher,
    navigator: Arc<dyn Navigator>,
    settings: SessionSettings,
    login_hooks: StdRwLock<Vec<Arc<dyn LoginHook>>>,
    logout_hooks: StdRwLock<Vec<Arc<dyn LogoutHook>>>,
    gates: StdRwLock<Vec<Arc<dyn ReadinessGate>>>,
    on_ready: StdRwLock<Option<ReadyCallback>>,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        credentials: CredentialStore,
        navigator: Arc<dyn Navigator>,
        event_bus: EventBus,
        settings: SessionSettings,
    ) -> Self {
        Self {
            refresher: Refresher {
                provider,
                credentials,
                event_bus,
                state: Arc::new(RwLock::new(AuthState::SignedOut)),
                min_validity: settings.token_min_validity,
            },
            navigator,
            settings,
            login_hooks: StdRwLock::new(Vec::new()),
            logout_hooks: StdRwLock::new(Vec::new()),
            gates: StdRwLock::new(Vec::new()),
            on_ready: StdRwLock::new(None),
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.refresher.credentials
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub async fn state(&self) -> AuthState {
        *self.refresher.state.read().await
    }

    pub fn register_login_hook(&self, hook: Arc<dyn LoginHook>) {
        self.login_hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    pub fn register_logout_hook(&self, hook: Arc<dyn LogoutHook>) {
        self.logout_hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    pub fn register_readiness_gate(&self, gate: Arc<dyn ReadinessGate>) {
        self.gates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(gate);
    }

    /// Callback invoked once per successful login, after `Ready` is emitted.
    pub fn set_on_ready(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.on_ready.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    /// Authenticate, run login hooks and wait for readiness.
    ///
    /// # Errors
    ///
    /// - `AuthError::AuthFailure` if the provider fails or `auth_timeout` elapses
    /// - `AuthError::NotReady` if a readiness gate fails
    #[instrument(skip(self))]
    pub async fn login(&self, redirect: Option<&str>) -> Result<()> {
        self.set_state(AuthState::SigningIn).await;
        self.emit(SessionEvent::SigningIn);

        let provider = &self.refresher.provider;
        let outcome = timeout(
            self.settings.auth_timeout,
            provider.init(&self.settings.identity),
        )
        .await;

        let credentials = match outcome {
            Ok(Ok(credentials)) => credentials,
            Ok(Err(e)) => return Err(self.fail_login(e.into_auth_failure(), redirect).await),
            Err(_) => {
                let e = AuthError::AuthFailure(format!(
                    "Login did not complete within {}s",
                    self.settings.auth_timeout.as_secs_f32()
                ));
                return Err(self.fail_login(e, redirect).await);
            }
        };

        self.enter(credentials).await
    }

    /// Start a session from tokens obtained outside the identity provider,
    /// then run login hooks and wait for readiness as [`login`](Self::login)
    /// does.
    ///
    /// # Errors
    ///
    /// `AuthError::NotReady` if a readiness gate fails.
    #[instrument(skip(self, credentials))]
    pub async fn login_with(&self, credentials: Credentials) -> Result<()> {
        self.set_state(AuthState::SigningIn).await;
        self.emit(SessionEvent::SigningIn);
        self.enter(credentials).await
    }

    async fn enter(&self, credentials: Credentials) -> Result<()> {
        info!(expires_at = %credentials.expires_at, "Signed in");
        self.refresher.credentials.replace(credentials).await;
        self.set_state(AuthState::SignedIn).await;
        self.emit(SessionEvent::SignedIn);

        let hooks = self
            .login_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in hooks {
            debug!(hook = hook.name(), "Running login hook");
            if let Err(e) = hook.on_login().await {
                warn!(hook = hook.name(), error = %e, "Login hook failed");
                self.emit(SessionEvent::AuthFailed {
                    message: format!("{}: {}", hook.name(), e),
                    fatal: false,
                });
            }
        }

        let gates = self
            .gates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for gate in gates {
            debug!(gate = gate.name(), "Awaiting readiness gate");
            if let Err(e) = gate.wait_ready().await {
                error!(gate = gate.name(), error = %e, "Readiness gate failed");
                return Err(AuthError::NotReady {
                    gate: gate.name().to_string(),
                    message: e.to_string(),
                });
            }
        }

        info!("Session ready");
        self.emit(SessionEvent::Ready);

        let callback = self
            .on_ready
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback();
        }
        Ok(())
    }

    /// Run logout hooks, end the provider session and clear credentials.
    ///
    /// Never fails: a provider error is reported through events and sends the
    /// navigator to the fallback location.
    #[instrument(skip(self))]
    pub async fn logout(&self, redirect: Option<&str>) {
        let hooks = self
            .logout_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in hooks {
            if let Err(e) = hook.on_logout().await {
                warn!(hook = hook.name(), error = %e, "Logout hook failed");
            }
        }

        let target = redirect.unwrap_or(&self.settings.fallback_redirect);
        let current = self.refresher.credentials.snapshot().await;
        let result = self
            .refresher
            .provider
            .logout(current.as_ref(), target)
            .await;

        self.refresher.credentials.clear().await;
        self.set_state(AuthState::SignedOut).await;

        match result {
            Ok(()) => {
                info!("Signed out");
                self.emit(SessionEvent::SignedOut);
                self.navigator.redirect(target);
            }
            Err(e) => {
                error!(error = %e, "Identity provider logout failed");
                self.emit(SessionEvent::SignedOut);
                self.emit(SessionEvent::AuthFailed {
                    message: e.to_string(),
                    fatal: true,
                });
                self.navigator.redirect(&self.settings.fallback_redirect);
            }
        }
    }

    /// Ask the provider to renew the token now.
    ///
    /// Returns `true` if the credentials were replaced.
    pub async fn refresh_now(&self) -> Result<bool> {
        self.refresher.refresh().await
    }

    /// Spawn the periodic refresh task. Dropping the handle stops it.
    pub fn start_refresh_daemon(&self) -> RefreshDaemon {
        let refresher = self.refresher.clone();
        let period = self.settings.refresh_interval;
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match refresher.refresh().await {
                            Ok(_) => {}
                            Err(AuthError::NotAuthenticated) => {
                                debug!("No active session; skipping refresh tick");
                            }
                            // Already logged and emitted.
                            Err(_) => {}
                        }
                    }
                }
            }
            debug!("Refresh daemon stopped");
        });

        info!(interval_secs = period.as_secs(), "Refresh daemon started");
        RefreshDaemon {
            cancel,
            handle: Some(handle),
        }
    }

    async fn fail_login(&self, error: AuthError, redirect: Option<&str>) -> AuthError {
        error!(error = %error, "Login failed");
        self.set_state(AuthState::SignedOut).await;
        self.emit(SessionEvent::AuthFailed {
            message: error.to_string(),
            fatal: true,
        });
        self.navigator
            .redirect(redirect.unwrap_or(&self.settings.fallback_redirect));
        error
    }

    async fn set_state(&self, state: AuthState) {
        *self.refresher.state.write().await = state;
    }

    fn emit(&self, event: SessionEvent) {
        self.refresher.event_bus.emit(CoreEvent::Session(event)).ok();
    }
}

/// Handle to the background refresh task.
pub struct RefreshDaemon {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RefreshDaemon {
    /// Stop the task and wait for it to finish its current tick.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Refresh daemon task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for RefreshDaemon {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
