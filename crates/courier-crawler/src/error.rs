//! Crawler error types.

use courier_domain::StoreError;
use thiserror::Error;

/// Crawler error type.
#[derive(Error, Debug)]
pub enum CrawlerError {
    /// Outbox store error
    #[error("Outbox store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid crawler configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type alias using CrawlerError.
pub type CrawlerResult<T> = Result<T, CrawlerError>;
