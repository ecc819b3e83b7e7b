//! Host Navigation
//!
//! Lets the core move the user agent away from the current location when the
//! session can no longer continue (authentication failure, logout).

/// Replaces the current location with another one.
///
/// Implementations should not keep the current location in history.
pub trait Navigator: Send + Sync {
    fn redirect(&self, location: &str);
}
