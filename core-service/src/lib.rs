//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, WebSocket,
//! cookies, navigation, identity provider) into one [`SessionContext`].
//! Desktop apps typically enable the `desktop-shims` feature (which depends
//! on `bridge-desktop`) and call [`SessionContext::desktop`].
//!
//! ```no_run
//! # #[cfg(feature = "desktop-shims")]
//! # async fn example(
//! #     callback: std::sync::Arc<dyn core_auth::AuthorizationCallback>,
//! # ) -> core_service::Result<()> {
//! use core_runtime::SessionConfig;
//! use core_service::SessionContext;
//!
//! let config = SessionConfig::builder()
//!     .endpoint("portal.example.com")
//!     .realm("portal")
//!     .client_id("console")
//!     .build()?;
//! let context = SessionContext::desktop(config, callback)?;
//! context.login(None).await?;
//! let buckets = context.buckets().list_group_buckets().await?;
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod context;
pub mod error;
pub mod handoff;

pub use account::{AccountClient, UserInfo};
pub use context::{HostBridges, SessionContext};
pub use error::{Result, ServiceError};
pub use handoff::{ConnectionDescriptor, TerminalHandoff, HANDOFF_COOKIE, TERMINAL_PATH};
