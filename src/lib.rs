//! Workspace umbrella crate.
//!
//! Host applications can depend on `session-core-workspace` and enable the
//! documented features instead of wiring each workspace crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
