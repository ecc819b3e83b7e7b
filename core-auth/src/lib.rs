//! # Session Authentication
//!
//! Credential handling and the session lifecycle for the runtime.
//!
//! ## Overview
//!
//! - [`CredentialStore`]: the single shared token cell every component reads
//! - [`IdentityProvider`]: pluggable login protocol, with [`KeycloakProvider`]
//!   implementing OpenID Connect + PKCE
//! - [`SessionManager`]: login, logout and the background [`RefreshDaemon`]
//!
//! Tokens never appear in logs or `Debug` output.

pub mod credentials;
pub mod error;
pub mod keycloak;
pub mod manager;
pub mod provider;
pub mod types;

pub use credentials::CredentialStore;
pub use error::{AuthError, Result};
pub use keycloak::{KeycloakProvider, PkceVerifier, RealmEndpoints};
pub use manager::{RefreshDaemon, SessionManager, SessionSettings};
pub use provider::{AuthorizationCallback, AuthorizationResponse, IdentityProvider};
pub use types::{AuthHeader, AuthState, Credentials, IdentityConfig, MAX_TOKEN_LIFETIME_SECS};
