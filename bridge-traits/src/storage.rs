//! Host Session Storage
//!
//! Short-lived, path-scoped name/value storage (browser cookies or an
//! equivalent host jar) used to hand small descriptors from one page or
//! window to another.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Path-scoped cookie storage provided by the host.
///
/// Values are opaque strings; callers encode structured data themselves.
#[async_trait]
pub trait CookieStore: Send + Sync {
    /// Read a cookie visible at the current location.
    async fn get(&self, name: &str) -> Result<Option<String>>;

    /// Write a cookie that expires after `max_age`, scoped to `path`.
    async fn set(&self, name: &str, value: &str, max_age: Duration, path: &str) -> Result<()>;

    /// Expire a cookie immediately.
    async fn delete(&self, name: &str, path: &str) -> Result<()>;
}
