//! # Session Configuration
//!
//! Provides configuration management for the session runtime.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! [`SessionConfig`]: the deployment endpoint, the identity realm/client, the
//! declared cache index, and the timing policies that bound every retry loop
//! and network call. `build()` validates the result and fails fast with an
//! actionable message.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::config::SessionConfig;
//!
//! let config = SessionConfig::builder()
//!     .endpoint("portal.example.com")
//!     .realm("acme")
//!     .client_id("web")
//!     .cache_table("Search", "history")
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.uerp_url(), "https://portal.example.com/uerp/v1");
//! assert!(config.cache_index.contains_key("Blob"));
//! ```
//!
//! ## Derived URLs
//!
//! | Service | URL |
//! |---------|-----|
//! | identity | `https://{endpoint}/auth` |
//! | account | `https://{endpoint}/account/v{version}` |
//! | uerp | `https://{endpoint}/uerp/v{version}` |
//! | data module | `https://{endpoint}/data/v1` |
//! | object store | `https://{endpoint}/minio/api/v1` |
//! | sockets | `wss://{endpoint}{path}` |

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Database that holds downloaded object payloads keyed by etag.
pub const BLOB_DATABASE: &str = "Blob";

/// Table inside [`BLOB_DATABASE`] holding the payload records.
pub const BLOB_TABLE: &str = "index";

const DEFAULT_VERSION: &str = "1";
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_MIN_VALIDITY: Duration = Duration::from_secs(300);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_UPLOAD_CONCURRENCY: usize = 4;
const MAX_UPLOAD_CONCURRENCY: usize = 64;

// ============================================================================
// Retry Policies
// ============================================================================

/// Reconnect scheduling for the duplex channel.
///
/// The delay before attempt `n` (1-based, counted since the last successful
/// open) is `delay * backoff_factor^(n-1)`, capped at `max_delay`. With the
/// default factor of `1.0` every reconnect waits exactly `delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Base delay before a reconnect
    pub delay: Duration,
    /// Upper bound on the computed delay
    pub max_delay: Duration,
    /// Multiplier applied per consecutive failure
    pub backoff_factor: f64,
    /// Consecutive failed attempts tolerated before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            backoff_factor: 1.0,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Fixed-delay policy with an attempt ceiling.
    pub fn fixed(delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            delay,
            max_delay: delay,
            backoff_factor: 1.0,
            max_attempts,
        }
    }

    /// Delay to wait before reconnect attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }

    /// Whether another attempt is allowed after `failures` consecutive failures.
    pub fn allows(&self, failures: u32) -> bool {
        self.max_attempts.map_or(true, |max| failures < max)
    }
}

/// Polling schedule for the cache stability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StabilityPolicy {
    pub poll_interval: Duration,
    /// Polls before reporting the cache as inconsistent; `None` polls forever
    pub max_attempts: Option<u32>,
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            max_attempts: Some(150),
        }
    }
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Complete runtime configuration. Use [`SessionConfigBuilder`] to construct.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deployment host, without scheme (e.g. `portal.example.com`)
    pub endpoint: String,
    /// Identity realm (tenant)
    pub realm: String,
    /// Identity client id
    pub client_id: String,
    /// API version used in account/uerp URLs
    pub version: String,
    /// Required tables per cache database; always contains `Blob: [index]`
    pub cache_index: BTreeMap<String, Vec<String>>,
    /// Directory for cache database files; `None` keeps the cache in memory
    pub cache_dir: Option<PathBuf>,
    pub refresh_interval: Duration,
    /// Remaining token validity below which the refresh daemon renews
    pub token_min_validity: Duration,
    pub reconnect: ReconnectPolicy,
    pub stability: StabilityPolicy,
    /// Maximum uploads in flight per batch
    pub upload_concurrency: usize,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub auth_timeout: Duration,
    /// Location used when login fails without an explicit redirect
    pub fallback_redirect: String,
}

impl SessionConfig {
    /// Creates a new builder.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    pub fn base_url(&self) -> String {
        format!("https://{}", self.endpoint)
    }

    pub fn auth_url(&self) -> String {
        format!("{}/auth", self.base_url())
    }

    pub fn account_url(&self) -> String {
        format!("{}/account/v{}", self.base_url(), self.version)
    }

    pub fn uerp_url(&self) -> String {
        format!("{}/uerp/v{}", self.base_url(), self.version)
    }

    pub fn data_module_url(&self) -> String {
        format!("{}/data/v1", self.base_url())
    }

    pub fn object_url(&self) -> String {
        format!("{}/minio/api/v1", self.base_url())
    }

    /// Secure WebSocket URL for a server path such as `/router/websocket`.
    pub fn socket_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("wss://{}{}", self.endpoint, path)
        } else {
            format!("wss://{}/{}", self.endpoint, path)
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        require_non_empty("endpoint", &self.endpoint)?;
        if self.endpoint.contains("://") || self.endpoint.ends_with('/') {
            return Err(Error::Config(format!(
                "endpoint must be a bare host such as 'portal.example.com', got '{}'",
                self.endpoint
            )));
        }
        require_non_empty("realm", &self.realm)?;
        require_non_empty("client_id", &self.client_id)?;
        require_non_empty("version", &self.version)?;

        for (database, tables) in &self.cache_index {
            validate_identifier("cache database", database)?;
            if tables.is_empty() {
                return Err(Error::Config(format!(
                    "cache database '{}' declares no tables",
                    database
                )));
            }
            for table in tables {
                validate_identifier("cache table", table)?;
            }
        }

        if self.upload_concurrency == 0 || self.upload_concurrency > MAX_UPLOAD_CONCURRENCY {
            return Err(Error::Config(format!(
                "upload_concurrency must be between 1 and {}, got {}",
                MAX_UPLOAD_CONCURRENCY, self.upload_concurrency
            )));
        }

        if self.refresh_interval.is_zero() {
            return Err(Error::Config(
                "refresh_interval must be greater than zero".to_string(),
            ));
        }

        if self.reconnect.backoff_factor < 1.0 || !self.reconnect.backoff_factor.is_finite() {
            return Err(Error::Config(format!(
                "reconnect backoff_factor must be >= 1.0, got {}",
                self.reconnect.backoff_factor
            )));
        }

        if self.stability.poll_interval.is_zero() {
            return Err(Error::Config(
                "stability poll_interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Config(format!(
            "{} is required. Call SessionConfig::builder().{}(...) before build().",
            field, field
        )));
    }
    Ok(())
}

fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{} name '{}' must be 1-64 characters of [A-Za-z0-9_-]",
            kind, name
        )))
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    endpoint: Option<String>,
    realm: Option<String>,
    client_id: Option<String>,
    version: Option<String>,
    cache_index: BTreeMap<String, Vec<String>>,
    cache_dir: Option<PathBuf>,
    refresh_interval: Option<Duration>,
    token_min_validity: Option<Duration>,
    reconnect: Option<ReconnectPolicy>,
    stability: Option<StabilityPolicy>,
    upload_concurrency: Option<usize>,
    request_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    auth_timeout: Option<Duration>,
    fallback_redirect: Option<String>,
}

impl SessionConfigBuilder {
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Identity realm; the tenant name in deployment terms.
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Declare a full database → tables index, replacing earlier declarations.
    pub fn cache_index(mut self, index: BTreeMap<String, Vec<String>>) -> Self {
        self.cache_index = index;
        self
    }

    /// Declare one required table, creating the database entry if needed.
    pub fn cache_table(mut self, database: impl Into<String>, table: impl Into<String>) -> Self {
        let tables = self.cache_index.entry(database.into()).or_default();
        let table = table.into();
        if !tables.contains(&table) {
            tables.push(table);
        }
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    pub fn token_min_validity(mut self, validity: Duration) -> Self {
        self.token_min_validity = Some(validity);
        self
    }

    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = Some(policy);
        self
    }

    pub fn stability_policy(mut self, policy: StabilityPolicy) -> Self {
        self.stability = Some(policy);
        self
    }

    pub fn upload_concurrency(mut self, limit: usize) -> Self {
        self.upload_concurrency = Some(limit);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = Some(timeout);
        self
    }

    pub fn fallback_redirect(mut self, location: impl Into<String>) -> Self {
        self.fallback_redirect = Some(location.into());
        self
    }

    /// Builds and validates the configuration.
    ///
    /// The `Blob` database with its `index` table is always added to the
    /// cache index.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the offending field.
    pub fn build(self) -> Result<SessionConfig> {
        let mut cache_index = self.cache_index;
        let blob = cache_index.entry(BLOB_DATABASE.to_string()).or_default();
        if !blob.iter().any(|t| t == BLOB_TABLE) {
            blob.push(BLOB_TABLE.to_string());
        }

        let config = SessionConfig {
            endpoint: self.endpoint.unwrap_or_default(),
            realm: self.realm.unwrap_or_default(),
            client_id: self.client_id.unwrap_or_default(),
            version: self.version.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            cache_index,
            cache_dir: self.cache_dir,
            refresh_interval: self.refresh_interval.unwrap_or(DEFAULT_REFRESH_INTERVAL),
            token_min_validity: self
                .token_min_validity
                .unwrap_or(DEFAULT_TOKEN_MIN_VALIDITY),
            reconnect: self.reconnect.unwrap_or_default(),
            stability: self.stability.unwrap_or_default(),
            upload_concurrency: self
                .upload_concurrency
                .unwrap_or(DEFAULT_UPLOAD_CONCURRENCY),
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            auth_timeout: self.auth_timeout.unwrap_or(DEFAULT_AUTH_TIMEOUT),
            fallback_redirect: self.fallback_redirect.unwrap_or_else(|| "/".to_string()),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> SessionConfigBuilder {
        SessionConfig::builder()
            .endpoint("portal.example.com")
            .realm("acme")
            .client_id("web")
    }

    #[test]
    fn test_builder_with_required_fields() {
        let config = minimal().build().unwrap();

        assert_eq!(config.version, "1");
        assert_eq!(config.refresh_interval, Duration::from_secs(60));
        assert_eq!(config.token_min_validity, Duration::from_secs(300));
        assert_eq!(config.reconnect.delay, Duration::from_secs(2));
        assert_eq!(config.stability.poll_interval, Duration::from_millis(200));
        assert_eq!(config.upload_concurrency, 4);
        assert_eq!(config.fallback_redirect, "/");
        assert!(config.cache_dir.is_none());
    }

    #[test]
    fn test_blob_index_always_declared() {
        let config = minimal().build().unwrap();
        assert_eq!(
            config.cache_index.get(BLOB_DATABASE),
            Some(&vec![BLOB_TABLE.to_string()])
        );

        let config = minimal()
            .cache_table("Blob", "thumbs")
            .cache_table("Search", "history")
            .build()
            .unwrap();
        assert_eq!(
            config.cache_index.get("Blob"),
            Some(&vec!["thumbs".to_string(), "index".to_string()])
        );
        assert_eq!(
            config.cache_index.get("Search"),
            Some(&vec!["history".to_string()])
        );
    }

    #[test]
    fn test_cache_table_deduplicates() {
        let config = minimal()
            .cache_table("Search", "history")
            .cache_table("Search", "history")
            .build()
            .unwrap();
        assert_eq!(config.cache_index["Search"].len(), 1);
    }

    #[test]
    fn test_derived_urls() {
        let config = minimal().version("2").build().unwrap();

        assert_eq!(config.base_url(), "https://portal.example.com");
        assert_eq!(config.auth_url(), "https://portal.example.com/auth");
        assert_eq!(
            config.account_url(),
            "https://portal.example.com/account/v2"
        );
        assert_eq!(config.uerp_url(), "https://portal.example.com/uerp/v2");
        assert_eq!(config.data_module_url(), "https://portal.example.com/data/v1");
        assert_eq!(
            config.object_url(),
            "https://portal.example.com/minio/api/v1"
        );
        assert_eq!(
            config.socket_url("/router/websocket"),
            "wss://portal.example.com/router/websocket"
        );
        assert_eq!(
            config.socket_url("router/websocket"),
            "wss://portal.example.com/router/websocket"
        );
    }

    #[test]
    fn test_builder_requires_endpoint() {
        let result = SessionConfig::builder()
            .realm("acme")
            .client_id("web")
            .build();
        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("endpoint")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_builder_rejects_endpoint_with_scheme() {
        let result = minimal().endpoint("https://portal.example.com").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_requires_realm_and_client() {
        let no_realm = SessionConfig::builder()
            .endpoint("portal.example.com")
            .client_id("web")
            .build();
        assert!(matches!(no_realm, Err(Error::Config(msg)) if msg.contains("realm")));

        let no_client = SessionConfig::builder()
            .endpoint("portal.example.com")
            .realm("acme")
            .build();
        assert!(matches!(no_client, Err(Error::Config(msg)) if msg.contains("client_id")));
    }

    #[test]
    fn test_validate_rejects_bad_table_name() {
        let result = minimal().cache_table("Search", "bad name").build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("bad name")));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let result = minimal().upload_concurrency(0).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_shrinking_backoff() {
        let policy = ReconnectPolicy {
            backoff_factor: 0.5,
            ..ReconnectPolicy::default()
        };
        let result = minimal().reconnect_policy(policy).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_reconnect_delay_fixed_by_default() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(10), Duration::from_secs(2));
        assert!(policy.allows(u32::MAX - 1));
    }

    #[test]
    fn test_reconnect_delay_backoff_is_capped() {
        let policy = ReconnectPolicy {
            delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            max_attempts: Some(3),
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
        assert!(policy.allows(2));
        assert!(!policy.allows(3));
    }
}
