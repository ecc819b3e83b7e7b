//! Default on-disk locations

use std::path::PathBuf;

const APP_DIR: &str = "session-core";

/// Directory holding the persistent cache databases.
///
/// Resolves to the platform data directory (e.g. `~/.local/share` on Linux),
/// falling back to `~/.local/share` and finally the working directory.
pub fn default_cache_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".local")
                .join("share")
        })
        .join(APP_DIR)
        .join("cache")
}
