//! Core types, configuration, and utilities for the courier binary.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, CrawlerSettings, DEFAULT_LOG_LEVEL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
