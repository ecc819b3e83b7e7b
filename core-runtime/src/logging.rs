//! # Logging & Tracing Infrastructure
//!
//! One `tracing-subscriber` registry for the whole runtime:
//! - pretty, JSON or compact output on stderr
//! - a level applied to every workspace crate, with noisy transport
//!   dependencies held at `warn`
//! - `RUST_LOG`-style overrides, also readable from `SESSION_LOG`
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
//!
//! let config = LoggingConfig::from_env()
//!     .with_format(LogFormat::Json)
//!     .with_level(LogLevel::Debug);
//!
//! init_logging(config)?;
//! tracing::info!("Session runtime started");
//! ```
//!
//! Token values never reach the log: credential types redact themselves in
//! `Debug`, and ad-hoc fields can go through [`redact_if_sensitive`].

use crate::error::{Error, Result};
use std::io;
use std::str::FromStr;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// Environment variable holding a filter override
pub const FILTER_ENV: &str = "SESSION_LOG";
/// Environment variable selecting the output format
pub const FORMAT_ENV: &str = "SESSION_LOG_FORMAT";

const WORKSPACE_CRATES: &[&str] = &[
    "core_runtime",
    "core_auth",
    "core_net",
    "core_cache",
    "core_service",
    "provider_object_store",
    "bridge_desktop",
];

const QUIET_DEPENDENCIES: &[&str] = &["h2", "hyper", "reqwest", "rustls", "sqlx", "tungstenite"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, colored; for a developer terminal
    Pretty,
    /// One flattened JSON object per event
    Json,
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(Error::Logging(format!(
                "unknown log format '{}', expected pretty, json or compact",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level for workspace crates
    pub level: LogLevel,
    /// Full filter override (e.g. `core_auth=debug,core_net=trace`)
    pub filter: Option<String>,
    /// Log span open/close and attach the span stack to JSON events
    pub enable_spans: bool,
    pub display_target: bool,
    pub display_thread_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            enable_spans: false,
            display_target: true,
            display_thread_info: false,
        }
    }
}

impl LoggingConfig {
    /// Defaults overridden by [`FILTER_ENV`] and [`FORMAT_ENV`].
    ///
    /// An unparseable format is ignored with the default kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(filter) = std::env::var(FILTER_ENV).ok().filter(|f| !f.trim().is_empty()) {
            config.filter = Some(filter);
        }
        if let Some(format) = std::env::var(FORMAT_ENV)
            .ok()
            .and_then(|f| f.parse().ok())
        {
            config.format = format;
        }
        config
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_spans(mut self, enable: bool) -> Self {
        self.enable_spans = enable;
        self
    }

    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }

    pub fn with_thread_info(mut self, display: bool) -> Self {
        self.display_thread_info = display;
        self
    }
}

/// Install the global subscriber. Call once during host startup.
///
/// # Errors
///
/// Returns `Error::Logging` if the filter does not parse or a global
/// subscriber is already installed.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;
    tracing_subscriber::registry()
        .with(output_layer(&config).with_filter(filter))
        .try_init()
        .map_err(|e| Error::Logging(format!("subscriber already installed: {}", e)))
}

fn output_layer(config: &LoggingConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let base = fmt::layer()
        .with_writer(io::stderr)
        .with_target(config.display_target)
        .with_thread_ids(config.display_thread_info)
        .with_thread_names(config.display_thread_info);

    match config.format {
        LogFormat::Pretty => base.pretty().with_span_events(span_events).boxed(),
        LogFormat::Json => base
            .json()
            .flatten_event(true)
            .with_current_span(config.enable_spans)
            .with_span_list(config.enable_spans)
            .boxed(),
        LogFormat::Compact => base.compact().with_span_events(span_events).boxed(),
    }
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let directives = match &config.filter {
        Some(custom) => custom.clone(),
        None => WORKSPACE_CRATES
            .iter()
            .map(|krate| format!("{}={}", krate, config.level.as_directive()))
            .chain(QUIET_DEPENDENCIES.iter().map(|dep| format!("{}=warn", dep)))
            .collect::<Vec<_>>()
            .join(","),
    };

    EnvFilter::try_new(&directives)
        .map_err(|e| Error::Logging(format!("invalid filter '{}': {}", directives, e)))
}

/// Replace a field value when its name looks like a credential.
///
/// ```ignore
/// use core_runtime::logging::redact_if_sensitive;
///
/// tracing::debug!(value = %redact_if_sensitive("refresh_token", raw), "Token received");
/// ```
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    const MARKERS: &[&str] = &[
        "token",
        "password",
        "secret",
        "authorization",
        "cookie",
        "verifier",
        "access_key",
        "accesskey",
    ];

    let field = field_name.to_ascii_lowercase();
    if MARKERS.iter().any(|marker| field.contains(marker)) {
        "[REDACTED]".to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_builder() {
        let config = LoggingConfig::default()
            .with_format(LogFormat::Json)
            .with_level(LogLevel::Debug)
            .with_filter("core_auth=trace")
            .with_spans(true)
            .with_thread_info(true);

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.filter.as_deref(), Some("core_auth=trace"));
        assert!(config.enable_spans);
        assert!(config.display_thread_info);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" compact ".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!(matches!("xml".parse::<LogFormat>(), Err(Error::Logging(_))));
    }

    #[test]
    fn test_redact_if_sensitive() {
        assert_eq!(redact_if_sensitive("access_token", "eyJ"), "[REDACTED]");
        assert_eq!(redact_if_sensitive("secretKey", "abc"), "[REDACTED]");
        assert_eq!(redact_if_sensitive("Guac-Req cookie", "{}"), "[REDACTED]");
        assert_eq!(redact_if_sensitive("bucket", "photos"), "photos");
    }

    #[test]
    fn test_default_filter_covers_workspace() {
        let config = LoggingConfig::default().with_level(LogLevel::Debug);
        let filter = build_filter(&config).unwrap().to_string();
        assert!(filter.contains("core_cache=debug"));
        assert!(filter.contains("provider_object_store=debug"));
        assert!(filter.contains("sqlx=warn"));
    }

    #[test]
    fn test_custom_filter_replaces_default() {
        let config = LoggingConfig::default().with_filter("core_net=trace");
        let filter = build_filter(&config).unwrap().to_string();
        assert!(filter.contains("core_net=trace"));
        assert!(!filter.contains("core_cache"));
    }
}
