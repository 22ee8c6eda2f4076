//! Logging for definition builds
//!
//! Builds are instrumented with `tracing`: one span per machine build, one
//! per preprocessor pass, one per diagram reconciliation and one for
//! finalization. This module installs a `tracing-subscriber` that prints
//! them.
//!
//! # Usage
//!
//! ```rust,no_run
//! use smalldb::core::logging::init_logging;
//!
//! // Level and format from the environment, or info/compact
//! init_logging(None, None).unwrap();
//! ```
//!
//! # Log Levels
//!
//! - `trace`: every directive, state and transition as it is added
//! - `debug`: passes, includes, merged decorations, skipped edges
//! - `info`: one line per finished build (default)
//! - `warn`: recoverable oddities, e.g. ignored environment values
//! - `error`: nothing; build failures are returned, not logged
//!
//! # Log Formats
//!
//! - `compact`: single line per event
//! - `pretty`: multi-line with source locations, for development
//! - `json`: one JSON object per event, for log aggregation
//!
//! # Environment Variables
//!
//! - `SMALLDB_LOG_LEVEL`: log level (trace|debug|info|warn|error|off)
//! - `SMALLDB_LOG_FORMAT`: log format (compact|pretty|json)
//! - `RUST_LOG`: full `EnvFilter` directive, used when `SMALLDB_LOG_LEVEL` is unset
//!
//! ```bash
//! # Follow one machine's include chain
//! RUST_LOG="info,smalldb::plugins::diagram=debug" smalldb build article.json
//! ```

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::{
    fmt::{self as subscriber_fmt, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Compact => write!(f, "compact"),
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl LogFormat {
    /// Get all valid format names
    pub fn variants() -> &'static [&'static str] {
        &["compact", "pretty", "json"]
    }
}

/// Resolved logging settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
}

impl LogSettings {
    /// Combine explicit arguments with `SMALLDB_LOG_LEVEL`,
    /// `SMALLDB_LOG_FORMAT` and `RUST_LOG`
    pub fn resolve(level: Option<&str>, format: Option<&str>) -> Result<Self, String> {
        Self::resolve_with(level, format, |key| std::env::var(key).ok())
    }

    fn resolve_with(
        level: Option<&str>,
        format: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, String> {
        let level = level
            .map(str::to_string)
            .or_else(|| lookup("SMALLDB_LOG_LEVEL"))
            .or_else(|| lookup("RUST_LOG"))
            .unwrap_or_else(|| "info".to_string());

        let format = format
            .map(str::to_string)
            .or_else(|| lookup("SMALLDB_LOG_FORMAT"))
            .map(|f| LogFormat::from_str(&f))
            .transpose()
            .map_err(|e| format!("Invalid log format: {}", e))?
            .unwrap_or_default();

        Ok(Self { level, format })
    }

    fn filter(&self) -> EnvFilter {
        if self.level == "off" {
            return EnvFilter::new("off");
        }
        EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Initialize the global tracing subscriber
///
/// # Arguments
///
/// * `level` - log level (trace|debug|info|warn|error|off). If None, uses
///   `SMALLDB_LOG_LEVEL` or `RUST_LOG`, or defaults to `info`.
/// * `format` - log format (compact|pretty|json). If None, uses
///   `SMALLDB_LOG_FORMAT`, or defaults to `compact`.
///
/// Returns an error for an unknown format or when a global subscriber is
/// already installed.
pub fn init_logging(level: Option<&str>, format: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let settings = LogSettings::resolve(level, format)?;
    let filter = settings.filter();

    match settings.format {
        LogFormat::Compact => {
            Registry::default()
                .with(filter)
                .with(
                    subscriber_fmt::Layer::default()
                        .with_writer(std::io::stderr)
                        .with_target(false)
                        .with_level(true)
                        .with_span_events(FmtSpan::NONE)
                        .compact(),
                )
                .try_init()?;
        }
        LogFormat::Pretty => {
            Registry::default()
                .with(filter)
                .with(
                    subscriber_fmt::Layer::default()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true)
                        .with_span_events(FmtSpan::ACTIVE)
                        .pretty(),
                )
                .try_init()?;
        }
        LogFormat::Json => {
            Registry::default()
                .with(filter)
                .with(
                    subscriber_fmt::Layer::default()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_span_events(FmtSpan::CLOSE)
                        .json(),
                )
                .try_init()?;
        }
    }

    Ok(())
}

/// Initialize logging with default settings
pub fn init_default_logging() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(None, None)
}
