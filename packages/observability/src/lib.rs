//! # Observability
//!
//! Centralized tracing setup for courier.
//!
//! Binaries call [`init_with_config`] once at startup and use the standard
//! `tracing` macros everywhere else. Library crates never install a
//! subscriber.
//!
//! ## Dev Mode
//!
//! Every process writes structured JSONL to one central file,
//! `~/.courier/logs/dev.jsonl` unless `log_path` says otherwise:
//!
//! - `tail -f ~/.courier/logs/dev.jsonl | jq` to follow a crawler
//! - `jq 'select(.fields.event_id == "...")'` to trace one event
//!
//! Lines are appended and flushed one at a time, so several processes can
//! share the file.
//!
//! ## Usage
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "courier".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! })?;
//! ```

#[cfg(feature = "dev")]
mod dev;

mod json_layer;

use std::io;
use std::path::PathBuf;

pub use json_layer::{LogEntry, REDACTED, SENSITIVE_FIELDS};

/// What the JSONL layer is allowed to write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ObservabilityMode {
    /// Every structured field as recorded.
    #[default]
    Verbose,
    /// Personal data fields (emails, payload bodies) are replaced by a marker.
    MetadataOnly,
}

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the process, included in every log line.
    pub service_name: String,

    /// Default filter (e.g. "debug", "info,courier_database=trace").
    /// `RUST_LOG` takes precedence.
    pub default_level: String,

    /// Log file; `~/.courier/logs/dev.jsonl` when unset.
    pub log_path: Option<PathBuf>,

    /// Also emit compact logs to stderr.
    pub also_stderr: bool,

    pub mode: ObservabilityMode,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
            mode: ObservabilityMode::Verbose,
        }
    }
}

/// Initialize with default settings for `service_name`.
pub fn init(service_name: &str) -> io::Result<()> {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    })
}

/// Initialize the global subscriber.
///
/// Fails when the log file cannot be opened. A second call in the same
/// process is a no-op.
pub fn init_with_config(config: LogConfig) -> io::Result<()> {
    install(&config)
}

#[cfg(feature = "dev")]
fn install(config: &LogConfig) -> io::Result<()> {
    dev::init_dev_subscriber(config)
}

#[cfg(not(feature = "dev"))]
fn install(config: &LogConfig) -> io::Result<()> {
    use tracing_subscriber::util::SubscriberInitExt;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_level)),
        )
        .with_target(true)
        .compact()
        .with_writer(io::stderr)
        .finish()
        .try_init();
    Ok(())
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;
