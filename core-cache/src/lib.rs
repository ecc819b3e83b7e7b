//! # Local Cache Module
//!
//! Durable, per-session JSON record cache on SQLite.
//!
//! ## Overview
//!
//! This module manages:
//! - One SQLite store per logical database name (`<cache_dir>/<name>.sqlite`)
//! - Transactional provisioning of each database's declared tables
//! - Record reads and writes keyed by id
//! - The stability check the session waits on before it reports `Ready`
//!
//! Reads against a database that could not be provisioned are cache misses,
//! never errors.

pub mod db;
pub mod error;
pub mod index;
pub mod registry;
pub mod store;

pub use db::StoreLocation;
pub use error::{CacheError, Result};
pub use index::CacheIndex;
pub use registry::CacheRegistry;
pub use store::{CacheDatabase, CacheTable, SCHEMA_VERSION};
