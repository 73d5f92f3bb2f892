//! Structured logging setup.
//!
//! The library only emits `tracing` events; installing a subscriber is up to the host.
//! [`init_logging`] is the one-call setup used by hosts that do not bring their own.

use anyhow::{Context, Result};
use std::env;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Log level: trace/debug/info/warn/error
    pub log_level: String,
    pub format: LogFormat,
    /// Write through a background thread via `tracing-appender`
    pub async_logging: bool,
    /// Extra filter directives (comma-separated), e.g. `dashrouter::registry=debug`
    pub target_filter: Option<String>,
    /// Include file:line location
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Json,
            async_logging: false,
            target_filter: None,
            include_location: false,
        }
    }
}

impl LogConfig {
    /// Read `DASHR_LOG_LEVEL`, `DASHR_LOG_FORMAT`, `DASHR_LOG_ASYNC`, `DASHR_LOG_FILTER`
    /// and `DASHR_LOG_INCLUDE_LOCATION`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Verbose pretty output for local development
    #[must_use]
    pub fn default_dev() -> Self {
        Self {
            log_level: "debug".to_string(),
            format: LogFormat::Pretty,
            async_logging: false,
            target_filter: None,
            include_location: true,
        }
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let flag = |key: &str, default: bool| {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };
        Self {
            log_level: lookup("DASHR_LOG_LEVEL").unwrap_or(defaults.log_level),
            format: lookup("DASHR_LOG_FORMAT")
                .map(|f| LogFormat::parse(&f))
                .unwrap_or(defaults.format),
            async_logging: flag("DASHR_LOG_ASYNC", defaults.async_logging),
            target_filter: lookup("DASHR_LOG_FILTER").filter(|f| !f.trim().is_empty()),
            include_location: flag("DASHR_LOG_INCLUDE_LOCATION", defaults.include_location),
        }
    }

    fn level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level().as_str()));

        // Connection resets from browsers closing tabs are not worth more than a warning.
        filter = filter.add_directive(
            "may_minihttp=warn"
                .parse()
                .context("may_minihttp filter directive")?,
        );

        if let Some(targets) = &self.target_filter {
            for directive in targets.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                filter = filter.add_directive(
                    directive
                        .parse()
                        .with_context(|| format!("invalid log filter directive: {directive}"))?,
                );
            }
        }
        Ok(filter)
    }
}

/// Install the global subscriber.
///
/// With async logging the returned guard owns the writer thread; keep it alive for as
/// long as logs should be flushed.
///
/// # Errors
///
/// Fails on an invalid filter directive or if a global subscriber is already set.
///
/// # Example
///
/// ```no_run
/// use dashrouter::logging::{init_logging, LogConfig};
///
/// let _guard = init_logging(&LogConfig::from_env())?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let registry = tracing_subscriber::registry().with(config.env_filter()?);

    let (writer, guard) = if config.async_logging {
        let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
        (Some(writer), Some(guard))
    } else {
        (None, None)
    };

    let fmt_layer = match (config.format, writer) {
        (LogFormat::Json, Some(writer)) => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_thread_names(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
        (LogFormat::Json, None) => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_thread_names(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .boxed(),
        (LogFormat::Pretty, Some(writer)) => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
        (LogFormat::Pretty, None) => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .boxed(),
    };

    registry
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;
    Ok(guard)
}
