//! # Event Bus System
//!
//! Provides a broadcast channel for session lifecycle, transport and cache
//! notifications, built on `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! Components emit typed [`CoreEvent`]s; any number of subscribers receive
//! every event emitted after they subscribed. Emission never blocks and never
//! fails the emitting operation: with no subscribers the event is discarded.
//!
//! ```text
//! ┌────────────────┐  emit   ┌──────────┐  subscribe  ┌────────────┐
//! │ SessionManager ├────────>│          ├────────────>│ Subscriber │
//! ├────────────────┤         │ EventBus │             └────────────┘
//! │ Channel        ├────────>│          │  subscribe  ┌────────────┐
//! ├────────────────┤         │          ├────────────>│ Subscriber │
//! │ CacheRegistry  ├────────>│          │             └────────────┘
//! └────────────────┘         └──────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SessionEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Session(SessionEvent::Ready)).ok();
//! assert_eq!(rx.recv().await.unwrap(), CoreEvent::Session(SessionEvent::Ready));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; it can keep receiving.
//! - **`RecvError::Closed`**: every sender is gone; treat as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Session(SessionEvent),
    Transport(TransportEvent),
    Cache(CacheEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Session(e) => e.description(),
            CoreEvent::Transport(e) => e.description(),
            CoreEvent::Cache(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Session(SessionEvent::AuthFailed { fatal: true, .. }) => {
                EventSeverity::Error
            }
            CoreEvent::Transport(TransportEvent::GaveUp { .. }) => EventSeverity::Error,
            CoreEvent::Cache(CacheEvent::ProvisionFailed { .. }) => EventSeverity::Error,
            CoreEvent::Session(SessionEvent::AuthFailed { .. })
            | CoreEvent::Session(SessionEvent::RefreshFailed { .. })
            | CoreEvent::Transport(TransportEvent::Closed { .. }) => EventSeverity::Warning,
            CoreEvent::Session(SessionEvent::SignedIn)
            | CoreEvent::Session(SessionEvent::Ready)
            | CoreEvent::Session(SessionEvent::SignedOut) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Session Events
// ============================================================================

/// Login, refresh and logout milestones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SessionEvent {
    /// Identity provider handshake started.
    SigningIn,
    /// Credentials are populated; post-login hooks are about to run.
    SignedIn,
    /// Hooks ran and every readiness gate passed.
    Ready,
    /// The access token was renewed in place.
    TokenRefreshed {
        /// New expiry (Unix epoch seconds).
        expires_at: i64,
    },
    /// A refresh attempt failed; the daemon retries on its next tick.
    RefreshFailed { message: String },
    /// Authentication could not be established or torn down.
    AuthFailed {
        message: String,
        /// `true` when the session cannot continue and the user was redirected.
        fatal: bool,
    },
    /// Credentials were cleared.
    SignedOut,
}

impl SessionEvent {
    fn description(&self) -> &str {
        match self {
            SessionEvent::SigningIn => "Authentication in progress",
            SessionEvent::SignedIn => "Signed in",
            SessionEvent::Ready => "Session ready",
            SessionEvent::TokenRefreshed { .. } => "Access token refreshed",
            SessionEvent::RefreshFailed { .. } => "Token refresh failed",
            SessionEvent::AuthFailed { .. } => "Authentication failure",
            SessionEvent::SignedOut => "Signed out",
        }
    }
}

// ============================================================================
// Transport Events
// ============================================================================

/// Reconnecting channel state changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum TransportEvent {
    Connecting {
        endpoint: String,
        /// Consecutive attempt number since the last successful open (1-based)
        attempt: u32,
    },
    Open { endpoint: String },
    Closed { endpoint: String, reason: String },
    /// The reconnect ceiling was reached; the channel is stopped.
    GaveUp { endpoint: String, attempts: u32 },
}

impl TransportEvent {
    fn description(&self) -> &str {
        match self {
            TransportEvent::Connecting { .. } => "Channel connecting",
            TransportEvent::Open { .. } => "Channel open",
            TransportEvent::Closed { .. } => "Channel closed",
            TransportEvent::GaveUp { .. } => "Channel gave up reconnecting",
        }
    }
}

// ============================================================================
// Cache Events
// ============================================================================

/// Local cache provisioning outcomes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    Provisioned {
        database: String,
        tables: Vec<String>,
    },
    /// The store could not be created; the database was dropped from the registry.
    ProvisionFailed { database: String, message: String },
    /// Every declared database matches its declared table set.
    Stable,
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::Provisioned { .. } => "Cache database provisioned",
            CacheEvent::ProvisionFailed { .. } => "Cache database unavailable",
            CacheEvent::Stable => "Cache schema stable",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event broadcaster. Cheap to clone; clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified per-subscriber buffer.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if nobody is subscribed. Emitters normally ignore the result.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
