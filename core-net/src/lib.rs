//! # Network Clients
//!
//! The two ways the runtime talks to the server:
//!
//! - [`RestClient`]: authenticated JSON request/response exchanges
//! - [`ReconnectingChannel`]: a duplex WebSocket channel that authenticates
//!   on every (re)connect and heals itself after drops
//!
//! Both read the shared [`CredentialStore`](core_auth::CredentialStore) at the
//! moment they need a token, so a background refresh is picked up without
//! any coordination.

pub mod channel;
pub mod error;
pub mod rest;

pub use channel::{ChannelHandle, ChannelHandlers, ChannelState, ReconnectingChannel};
pub use error::{RequestError, Result, TransportError, TransportResult};
pub use rest::RestClient;
