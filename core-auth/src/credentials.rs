//! Shared Credential Store
//!
//! One store exists per session context. Every component that talks to the
//! server holds a clone; clones share the same cell, so a refresh performed by
//! the session manager is visible to all of them on their next read.
//!
//! Readers should take the header at the moment they build a request and not
//! hold it across an `.await` when freshness matters.

use crate::error::{AuthError, Result};
use crate::types::{AuthHeader, Credentials};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Holder of the current token set.
#[derive(Clone, Default)]
pub struct CredentialStore {
    inner: Arc<RwLock<Option<Credentials>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new token set, overwriting the previous one in place.
    pub async fn replace(&self, credentials: Credentials) {
        *self.inner.write().await = Some(credentials);
    }

    /// Install a renewed token set only while a session is still active.
    ///
    /// Check and write happen under one lock, so a concurrent
    /// [`clear`](Self::clear) is never undone. Returns whether the set was
    /// installed.
    pub async fn replace_if_signed_in(&self, credentials: Credentials) -> bool {
        let mut slot = self.inner.write().await;
        if slot.is_none() {
            return false;
        }
        *slot = Some(credentials);
        true
    }

    /// Drop the current token set.
    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }

    /// Copy of the current token set.
    pub async fn snapshot(&self) -> Option<Credentials> {
        self.inner.read().await.clone()
    }

    pub async fn is_signed_in(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// Current access token.
    ///
    /// # Errors
    ///
    /// `AuthError::NotAuthenticated` when no session is active.
    pub async fn access_token(&self) -> Result<String> {
        self.inner
            .read()
            .await
            .as_ref()
            .map(|c| c.access_token.clone())
            .ok_or(AuthError::NotAuthenticated)
    }

    /// Header for the current access token.
    ///
    /// # Errors
    ///
    /// `AuthError::NotAuthenticated` when no session is active.
    pub async fn auth_header(&self) -> Result<AuthHeader> {
        self.inner
            .read()
            .await
            .as_ref()
            .map(Credentials::auth_header)
            .ok_or(AuthError::NotAuthenticated)
    }

    /// Whether two handles refer to the same underlying cell.
    pub fn same_store(&self, other: &CredentialStore) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}
