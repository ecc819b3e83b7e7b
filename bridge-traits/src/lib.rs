//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the session runtime and the
//! platform-specific pieces it cannot own itself: the network stack, the user
//! agent's cookie jar and its current location.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Single-attempt async HTTP with JSON and multipart bodies
//! - [`WebSocketConnector`](websocket::WebSocketConnector) - Duplex sockets split into sender/receiver halves
//!
//! ### User agent
//! - [`CookieStore`](storage::CookieStore) - Path-scoped short-lived values
//! - [`Navigator`](navigation::Navigator) - Location replacement on fatal session events
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate |
//! |----------|---------------------|
//! | Desktop  | `bridge-desktop`    |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Platform
//! implementations should convert their native errors into it and keep the
//! message actionable (URL, status, path).
//!
//! ## Thread Safety
//!
//! Connector and client traits require `Send + Sync`; socket halves are `Send`
//! and owned by exactly one task.

pub mod error;
pub mod http;
pub mod navigation;
pub mod storage;
pub mod websocket;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpBody, HttpClient, HttpMethod, HttpRequest, HttpResponse, MultipartPart};
pub use navigation::Navigator;
pub use storage::CookieStore;
pub use websocket::{
    WebSocketConnection, WebSocketConnector, WebSocketReceiver, WebSocketSender, WsFrame,
};
