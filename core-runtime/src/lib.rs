//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the session runtime:
//! - Logging and tracing infrastructure
//! - Configuration and retry policies
//! - Event bus system
//! - Session lifecycle extension points
//!
//! ## Overview
//!
//! Every other workspace crate depends on this one for its configuration
//! types, its event vocabulary and the hook traits that let independent
//! components join the login sequence without depending on each other.

pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod logging;

pub use config::{
    ReconnectPolicy, SessionConfig, SessionConfigBuilder, StabilityPolicy, BLOB_DATABASE,
    BLOB_TABLE,
};
pub use error::{Error, Result};
pub use events::{CacheEvent, CoreEvent, EventBus, SessionEvent, TransportEvent};
pub use lifecycle::{LoginHook, LogoutHook, ReadinessGate};
