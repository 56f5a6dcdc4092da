//! Shared telemetry bootstrap for PulseVault binaries.

use crate::{Error, Result};

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Parsed logging configuration from environment.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub level: Level,
    pub json: bool,
}

impl TelemetryConfig {
    /// Environment variables:
    /// - PULSEVAULT_LOG_LEVEL: trace|debug|info|warn|error (overrides the default)
    /// - PULSEVAULT_LOG_JSON: emit JSON lines instead of human-readable output
    pub fn from_env(default_service_name: &str, default_level: &str) -> Result<Self> {
        let service_name = default_service_name.trim();
        if service_name.is_empty() {
            return Err(Error::Config("service name cannot be empty".to_string()));
        }

        let level_raw =
            std::env::var("PULSEVAULT_LOG_LEVEL").unwrap_or_else(|_| default_level.to_string());
        let level = parse_log_level(&level_raw)?;
        let json = parse_optional_bool("PULSEVAULT_LOG_JSON")?.unwrap_or(false);

        Ok(Self {
            service_name: service_name.to_string(),
            level,
            json,
        })
    }
}

/// Initialize the tracing subscriber for a binary.
pub fn init_for_component(default_service_name: &str, log_level: &str) -> Result<TelemetryConfig> {
    let config = TelemetryConfig::from_env(default_service_name, log_level)?;

    let builder = FmtSubscriber::builder()
        .with_max_level(config.level)
        .with_target(true);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| Error::Config(format!("failed to initialize telemetry subscriber: {e}")))?;

    info!(
        service_name = %config.service_name,
        level = %config.level,
        json = config.json,
        "Telemetry bootstrap initialized"
    );

    Ok(config)
}

fn parse_log_level(raw: &str) -> Result<Level> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(Error::Config(format!(
            "invalid log level '{other}', expected one of [trace, debug, info, warn, error]"
        ))),
    }
}

fn parse_optional_bool(name: &str) -> Result<Option<bool>> {
    let Some(raw) = std::env::var(name).ok() else {
        return Ok(None);
    };
    let value = raw.trim().to_ascii_lowercase();
    match value.as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(Error::Config(format!(
            "{name} must be a boolean (true/false/1/0), got '{raw}'"
        ))),
    }
}
