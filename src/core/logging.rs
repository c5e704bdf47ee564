//! Tracing subscriber setup driven by `global.logging`.
//!
//! Logs go to stderr so stdout stays reserved for the JSON response.
//! `RUST_LOG`, when set, overrides the configured level.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::LoggingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(formatter: &str) -> Self {
        match formatter.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "default" | "" => LogFormat::Compact,
            _ => LogFormat::Text,
        }
    }
}

/// Unknown level names fall back to INFO.
pub fn parse_level(level: &str) -> Option<Level> {
    match level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Some(Level::TRACE),
        "DEBUG" => Some(Level::DEBUG),
        "INFO" => Some(Level::INFO),
        "WARN" | "WARNING" => Some(Level::WARN),
        "ERROR" | "FATAL" | "PANIC" => Some(Level::ERROR),
        _ => None,
    }
}

fn filter_for(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()))
}

/// Installs the global subscriber. A second call is a no-op.
pub fn init(config: &LoggingConfig) {
    let level = parse_level(&config.level);
    let filter = filter_for(level.unwrap_or(Level::INFO));
    let registry = Registry::default().with(filter);

    let installed = match LogFormat::parse(&config.formatter) {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    if installed.is_ok() && level.is_none() {
        tracing::warn!(level = %config.level, "unknown log level, using INFO");
    }
}
