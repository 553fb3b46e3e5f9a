//! Outbox crawler for reliable event delivery.
//!
//! This crate provides:
//! - OutboxCrawler: periodic pass over undelivered events, one publication per attempt
//! - Subscriber / SubscriptionRouter: the side effects an event triggers and their wiring
//! - StaticRouter: map-backed router used by the binary and tests
//!
//! The crawler depends only on `OutboxStore`, so it runs the same against
//! the SQLite store and the in-memory double.

mod crawler;
mod error;
mod subscriber;

pub use crawler::{CrawlReport, CrawlerConfig, EventOutcome, OutboxCrawler};
pub use error::{CrawlerError, CrawlerResult};
pub use subscriber::{StaticRouter, Subscriber, SubscriptionRouter};
