//! In-process cookie jar and location sink for desktop hosts

use async_trait::async_trait;
use bridge_traits::{error::Result, navigation::Navigator, storage::CookieStore};
use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct CookieEntry {
    value: String,
    expires_at: Instant,
}

/// Cookie jar shared by every window of one desktop process.
///
/// Cookies are keyed by `(path, name)`. A read sees a cookie if it was set on
/// any path; expired entries are evicted on access.
#[derive(Debug, Default)]
pub struct MemoryCookieStore {
    entries: Mutex<HashMap<(String, String), CookieEntry>>,
}

impl MemoryCookieStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CookieStore for MemoryCookieStore {
    async fn get(&self, name: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);

        Ok(entries
            .iter()
            .find(|((_, key), _)| key == name)
            .map(|(_, entry)| entry.value.clone()))
    }

    async fn set(&self, name: &str, value: &str, max_age: Duration, path: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            (path.to_string(), name.to_string()),
            CookieEntry {
                value: value.to_string(),
                expires_at: Instant::now() + max_age,
            },
        );
        debug!(name, path, max_age_secs = max_age.as_secs(), "Cookie set");
        Ok(())
    }

    async fn delete(&self, name: &str, path: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.remove(&(path.to_string(), name.to_string()));
        debug!(name, path, "Cookie deleted");
        Ok(())
    }
}

/// Navigator that records the last requested location and logs it.
///
/// Desktop shells poll [`TracingNavigator::last_location`] (or subscribe to
/// the log) to swap the visible view.
#[derive(Debug, Default)]
pub struct TracingNavigator {
    last: StdMutex<Option<String>>,
}

impl TracingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_location(&self) -> Option<String> {
        self.last.lock().ok().and_then(|guard| guard.clone())
    }
}

impl Navigator for TracingNavigator {
    fn redirect(&self, location: &str) {
        info!(location, "Redirect requested");
        if let Ok(mut guard) = self.last.lock() {
            *guard = Some(location.to_string());
        }
    }
}
