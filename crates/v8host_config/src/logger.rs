use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::jsonl::{JsonlLayer, JsonlWriter};

const WHITELISTED_CRATES: &[&str] = &[
    "v8host_config",
    "v8host_runtime",
    "v8host_debug_agent",
    "v8host_ffi",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggerConfig {
    #[serde(default = "crate::defaults::default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LoggerFormat,
    #[serde(default = "crate::defaults::default_true")]
    pub colors: bool,
    /// Optional JSONL file receiving every event at or above `level`.
    /// Console output is kept either way.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum LoggerFormat {
    #[serde(rename = "compact")]
    #[default]
    Compact,
    #[serde(rename = "pretty")]
    Pretty,
    #[serde(rename = "json")]
    Json,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::Info,
            format: LoggerFormat::Compact,
            colors: true,
            file: None,
        }
    }
}

/// Define an enumeration for log levels
/// Ordered from lowest to highest severity: Trace < Debug < Info < Warn < Error
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// The "trace" level.
    #[serde(rename = "trace", alias = "TRACE")]
    Trace,
    /// The "debug" level.
    #[serde(rename = "debug", alias = "DEBUG")]
    Debug,
    /// The "info" level.
    #[serde(rename = "info", alias = "INFO")]
    #[default]
    Info,
    /// The "warn" level.
    #[serde(rename = "warn", alias = "WARN")]
    Warn,
    /// The "error" level.
    #[serde(rename = "error", alias = "ERROR")]
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Filter directive enabling `level` for the workspace crates and `warn`
/// for everything else.
pub fn default_env_filter(level: LogLevel) -> String {
    let mut filters: Vec<String> = WHITELISTED_CRATES
        .iter()
        .map(|crate_name| format!("{crate_name}={}", level.as_str()))
        .collect();

    filters.insert(0, "warn".to_string());

    filters.join(",")
}

/// Installs the global `tracing` subscriber described by `config`.
///
/// `RUST_LOG` overrides the level-derived filter when set.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or a global subscriber
/// has already been installed.
pub fn init_logger(config: &LoggerConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_env_filter(config.level)));

    let fmt_layer = match config.format {
        LoggerFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(config.colors)
            .boxed(),
        LoggerFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_ansi(config.colors)
            .boxed(),
        LoggerFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };

    let file_layer = match &config.file {
        Some(path) => {
            let writer = JsonlWriter::new(path)
                .context(format!("Failed opening log file: {path}"))?;
            Some(JsonlLayer::new(writer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(file_layer)
        .try_init()
        .context("Failed initializing tracing subscriber")?;

    Ok(())
}
