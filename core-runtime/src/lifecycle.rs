//! # Session Lifecycle Extension Points
//!
//! Components that must act when a session starts or ends register one of
//! these traits with the session manager instead of being called directly.
//! Each trait object is identified by [`name`](LoginHook::name) in logs.
//!
//! Hooks run sequentially in registration order. Their errors are
//! heterogeneous (HTTP, storage, parsing), so they return `anyhow::Result`.

use async_trait::async_trait;

/// Runs after credentials are populated, before readiness is awaited.
///
/// A failing login hook is logged and reported but does not abort login.
#[async_trait]
pub trait LoginHook: Send + Sync {
    fn name(&self) -> &str;

    async fn on_login(&self) -> anyhow::Result<()>;
}

/// Runs before the identity provider logout call.
#[async_trait]
pub trait LogoutHook: Send + Sync {
    fn name(&self) -> &str;

    async fn on_logout(&self) -> anyhow::Result<()>;
}

/// Blocks the `ready` signal until some local precondition holds.
///
/// A failing gate fails the login.
#[async_trait]
pub trait ReadinessGate: Send + Sync {
    fn name(&self) -> &str;

    async fn wait_ready(&self) -> anyhow::Result<()>;
}
