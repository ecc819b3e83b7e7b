//! # SQLite Connection Pools
//!
//! Every logical cache database lives in its own SQLite file,
//! `<cache_dir>/<name>.sqlite`, or in a private in-memory database for tests.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_cache::db::{connect, StoreLocation};
//!
//! let pool = connect(&StoreLocation::directory("/var/cache/app"), "Blob").await?;
//! ```

use crate::error::{CacheError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where cache databases are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// One `<name>.sqlite` file per database under this directory
    Directory(PathBuf),
    /// Private in-memory database per name; contents vanish with the pool
    Memory,
}

impl StoreLocation {
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::Directory(path.into())
    }

    /// File backing database `name`, if file-backed.
    pub fn file_for(&self, name: &str) -> Option<PathBuf> {
        match self {
            StoreLocation::Directory(dir) => Some(dir.join(format!("{}.sqlite", name))),
            StoreLocation::Memory => None,
        }
    }
}

/// Reject names that would escape the cache directory or are empty.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CacheError::InvalidName("name must not be empty".to_string()));
    }
    if name.contains(['/', '\\', '\0']) || name == "." || name == ".." {
        return Err(CacheError::InvalidName(format!(
            "'{}' is not a valid database name",
            name
        )));
    }
    Ok(())
}

/// Double-quoted SQLite identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Open the pool for database `name`.
///
/// # Errors
///
/// `CacheError::Provision` if the directory or file cannot be created or opened.
pub async fn connect(location: &StoreLocation, name: &str) -> Result<Pool<Sqlite>> {
    validate_name(name)?;
    let provision_error = |message: String| CacheError::Provision {
        database: name.to_string(),
        message,
    };

    let pool = match location {
        StoreLocation::Directory(dir) => {
            ensure_dir(dir)
                .await
                .map_err(|e| provision_error(format!("{}: {}", dir.display(), e)))?;
            let path = dir.join(format!("{}.sqlite", name));
            debug!(database = name, path = %path.display(), "Opening cache file");

            let options = SqliteConnectOptions::new()
                .filename(&path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .busy_timeout(Duration::from_secs(5));

            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(4)
                .acquire_timeout(Duration::from_secs(30))
                .idle_timeout(Some(Duration::from_secs(600)))
                .connect_with(options)
                .await
        }
        StoreLocation::Memory => {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| provision_error(e.to_string()))?;

            // A second connection would see a different, empty database.
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
        }
    }
    .map_err(|e| {
        warn!(database = name, error = %e, "Failed to open cache database");
        provision_error(e.to_string())
    })?;

    info!(database = name, "Cache database opened");
    Ok(pool)
}

async fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await
}
