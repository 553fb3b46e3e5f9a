//! Logging initialization for the courier binary.
//!
//! Every courier process writes structured JSONL to the central log file
//! (`~/.courier/logs/dev.jsonl` unless a path is given) through the
//! observability crate.

use crate::{CoreError, CoreResult};
use observability::{LogConfig, ObservabilityMode};
use std::path::PathBuf;

const SERVICE_NAME: &str = "courier";

/// Initialize the logging system.
///
/// - Structured JSONL output to `log_path` or the central default
/// - Log level from `RUST_LOG` or the provided default
/// - `COURIER_OBS_MODE=prod` switches to metadata-only output
///
/// ```ignore
/// init_logging("info", None)?;
/// tracing::info!("Crawler started");
/// ```
pub fn init_logging(level: &str, log_path: Option<PathBuf>) -> CoreResult<()> {
    let mode = observability_mode(std::env::var("COURIER_OBS_MODE").ok().as_deref());

    observability::init_with_config(LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: level.into(),
        log_path,
        also_stderr: true,
        mode,
    })
    .map_err(|e| CoreError::Config(format!("failed to initialize logging: {e}")))
}

fn observability_mode(raw: Option<&str>) -> ObservabilityMode {
    match raw
        .map(|value| value.trim().to_ascii_lowercase())
        .as_deref()
    {
        Some("prod") | Some("production") => ObservabilityMode::MetadataOnly,
        _ => ObservabilityMode::Verbose,
    }
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
