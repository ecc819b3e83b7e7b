//! # Cache Registry
//!
//! Owns every open [`CacheDatabase`] for a session, keyed by name.
//!
//! A database whose store cannot be provisioned is dropped: the failure is
//! logged and broadcast once, and later [`CacheRegistry::table`] lookups for it
//! return `None` so callers fall through to the network.
//!
//! The registry is also the session's cache [`ReadinessGate`]: it provisions
//! the declared [`CacheIndex`] and then polls until every database holds
//! exactly its declared tables.

use crate::db::StoreLocation;
use crate::error::{CacheError, Result};
use crate::index::CacheIndex;
use crate::store::{CacheDatabase, CacheTable};
use async_trait::async_trait;
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use core_runtime::{ReadinessGate, StabilityPolicy};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

#[derive(Default)]
struct RegistryState {
    open: HashMap<String, CacheDatabase>,
    dropped: HashSet<String>,
}

pub struct CacheRegistry {
    location: StoreLocation,
    index: CacheIndex,
    stability: StabilityPolicy,
    event_bus: EventBus,
    state: Mutex<RegistryState>,
}

impl CacheRegistry {
    pub fn new(
        location: StoreLocation,
        index: CacheIndex,
        stability: StabilityPolicy,
        event_bus: EventBus,
    ) -> Self {
        Self {
            location,
            index,
            stability,
            event_bus,
            state: Mutex::new(RegistryState::default()),
        }
    }

    pub fn index(&self) -> &CacheIndex {
        &self.index
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Open `name` and provision `tables`. Calling again for an open database
    /// only adds the missing tables.
    ///
    /// # Errors
    ///
    /// A store that cannot be created is dropped from the registry and
    /// `CacheEvent::ProvisionFailed` is emitted. Failing to extend a database
    /// that is already open returns the error and keeps the database and its
    /// handed-out tables usable.
    #[instrument(skip(self, tables), fields(tables = ?tables))]
    pub async fn open(&self, name: &str, tables: &[String]) -> Result<CacheDatabase> {
        let mut state = self.state.lock().await;

        if let Some(database) = state.open.get_mut(name) {
            if let Err(e) = database.provision(tables).await {
                warn!(database = name, error = %e, "Could not extend cache database");
                return Err(e);
            }
            let database = database.clone();
            self.provisioned(&database);
            return Ok(database);
        }

        match CacheDatabase::open(&self.location, name, tables).await {
            Ok(database) => {
                state.dropped.remove(name);
                state.open.insert(name.to_string(), database.clone());
                self.provisioned(&database);
                Ok(database)
            }
            Err(e) => {
                warn!(database = name, error = %e, "Dropping cache database");
                state.dropped.insert(name.to_string());
                self.event_bus
                    .emit(CoreEvent::Cache(CacheEvent::ProvisionFailed {
                        database: name.to_string(),
                        message: e.to_string(),
                    }))
                    .ok();
                Err(e)
            }
        }
    }

    fn provisioned(&self, database: &CacheDatabase) {
        info!(database = database.name(), "Cache database ready");
        self.event_bus
            .emit(CoreEvent::Cache(CacheEvent::Provisioned {
                database: database.name().to_string(),
                tables: database.provisioned_tables().to_vec(),
            }))
            .ok();
    }

    /// Open every database of the index. Failures are recorded as dropped
    /// databases and do not stop the remaining ones.
    pub async fn initialize(&self) -> Result<()> {
        for database in self.index.databases() {
            let tables = self.index.tables(database).unwrap_or_default();
            if let Err(e) = self.open(database, tables).await {
                debug!(database, error = %e, "Continuing without database");
            }
        }
        Ok(())
    }

    pub async fn database(&self, name: &str) -> Option<CacheDatabase> {
        self.state.lock().await.open.get(name).cloned()
    }

    pub async fn is_dropped(&self, name: &str) -> bool {
        self.state.lock().await.dropped.contains(name)
    }

    /// Table handle, opening an indexed database on first use.
    ///
    /// `None` means the database was dropped, or neither the registry nor the
    /// index knows the table. Callers treat it as a cache miss.
    pub async fn table(&self, database: &str, table: &str) -> Option<CacheTable> {
        {
            let state = self.state.lock().await;
            if state.dropped.contains(database) {
                return None;
            }
            if let Some(open) = state.open.get(database) {
                if let Some(handle) = open.table(table) {
                    return Some(handle);
                }
            }
        }

        let declared = self.index.tables(database)?;
        if !declared.iter().any(|t| t == table) {
            return None;
        }
        self.open(database, declared).await.ok()?.table(table)
    }

    /// Poll until every non-dropped database of `index` holds exactly its
    /// declared tables, then emit `CacheEvent::Stable`.
    ///
    /// # Errors
    ///
    /// `CacheError::Unstable` once `policy.max_attempts` polls have failed.
    #[instrument(skip(self, index, policy), fields(databases = index.len()))]
    pub async fn wait_stable(&self, index: &CacheIndex, policy: &StabilityPolicy) -> Result<()> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let pending = self.pending(index).await;

            if pending.is_empty() {
                info!(attempts, "Cache schema stable");
                self.event_bus.emit(CoreEvent::Cache(CacheEvent::Stable)).ok();
                return Ok(());
            }

            if policy.max_attempts.is_some_and(|max| attempts >= max) {
                warn!(attempts, pending = ?pending, "Cache schema did not settle");
                return Err(CacheError::Unstable { attempts, pending });
            }

            debug!(attempts, pending = ?pending, "Cache schema not stable yet");
            tokio::time::sleep(policy.poll_interval).await;
        }
    }

    async fn pending(&self, index: &CacheIndex) -> Vec<String> {
        let mut pending = Vec::new();
        for name in index.databases() {
            if self.is_dropped(name).await {
                continue;
            }

            let database = match self.database(name).await {
                Some(database) => database,
                None => {
                    let tables = index.tables(name).unwrap_or_default();
                    match self.open(name, tables).await {
                        Ok(database) => database,
                        Err(_) => {
                            pending.push(name.to_string());
                            continue;
                        }
                    }
                }
            };

            match database.table_names().await {
                Ok(actual) if actual == index.sorted_tables(name) => {}
                Ok(actual) => {
                    debug!(database = name, actual = ?actual, "Table set differs");
                    pending.push(name.to_string());
                }
                Err(e) => {
                    debug!(database = name, error = %e, "Table check failed");
                    pending.push(name.to_string());
                }
            }
        }
        pending
    }
}

#[async_trait]
impl ReadinessGate for CacheRegistry {
    fn name(&self) -> &str {
        "cache"
    }

    async fn wait_ready(&self) -> anyhow::Result<()> {
        self.initialize().await?;
        self.wait_stable(&self.index, &self.stability).await?;
        Ok(())
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("location", &self.location)
            .field("index", &self.index)
            .field("stability", &self.stability)
            .finish_non_exhaustive()
    }
}
