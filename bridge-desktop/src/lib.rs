//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` with a shared cookie jar
//! - `WebSocketConnector` using `tokio-tungstenite`
//! - `CookieStore` as an in-process jar
//! - `Navigator` that records and logs the requested location
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, TungsteniteConnector};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let http_client = ReqwestHttpClient::new(Duration::from_secs(30))?;
//!     let sockets = TungsteniteConnector::new(Duration::from_secs(10));
//!
//!     // Hand both to the session context
//!     Ok(())
//! }
//! ```

mod http;
mod paths;
mod session;
mod websocket;

pub use http::ReqwestHttpClient;
pub use paths::default_cache_dir;
pub use session::{MemoryCookieStore, TracingNavigator};
pub use websocket::TungsteniteConnector;
