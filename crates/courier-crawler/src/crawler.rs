//! Outbox crawler: fetch undelivered events, call subscribers, record the attempt.

use crate::subscriber::{Subscriber, SubscriptionRouter};
use crate::{CrawlerError, CrawlerResult};
use courier_domain::{
    Clock, DomainEvent, EventId, OutboxStore, Publication, SubscriberFailure,
};
use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Crawler configuration.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Maximum events fetched per pass.
    pub batch_size: usize,
    /// Delay between passes.
    pub poll_interval: Duration,
    /// Budget for a single subscriber call.
    pub subscriber_timeout: Duration,
    /// Events processed at the same time within a pass.
    pub max_concurrent_events: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval: Duration::from_secs(10),
            subscriber_timeout: Duration::from_secs(30),
            max_concurrent_events: 8,
        }
    }
}

impl CrawlerConfig {
    pub fn validate(&self) -> CrawlerResult<()> {
        if self.batch_size == 0 {
            return Err(CrawlerError::Config("batch_size must be at least 1".to_string()));
        }
        if self.max_concurrent_events == 0 {
            return Err(CrawlerError::Config(
                "max_concurrent_events must be at least 1".to_string(),
            ));
        }
        if self.subscriber_timeout.is_zero() {
            return Err(CrawlerError::Config(
                "subscriber_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// What happened to one event during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Delivered,
    PartiallyFailed,
    /// Quarantined, already delivered, or being processed by this crawler.
    Skipped,
}

/// Summary of one [`OutboxCrawler::crawl_once`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub fetched: usize,
    pub delivered: usize,
    pub partially_failed: usize,
    pub skipped: usize,
    /// Events whose new publication could not be saved.
    pub save_errors: usize,
}

/// Delivers outbox events to their subscribers.
pub struct OutboxCrawler {
    store: Arc<dyn OutboxStore>,
    router: Arc<dyn SubscriptionRouter>,
    clock: Arc<dyn Clock>,
    config: CrawlerConfig,
    in_flight: Mutex<HashSet<EventId>>,
}

/// Releases an in-flight claim when dropped.
struct InFlightClaim<'a> {
    in_flight: &'a Mutex<HashSet<EventId>>,
    event_id: EventId,
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.event_id);
    }
}

impl OutboxCrawler {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        router: Arc<dyn SubscriptionRouter>,
        clock: Arc<dyn Clock>,
        config: CrawlerConfig,
    ) -> CrawlerResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            router,
            clock,
            config,
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    /// Number of events currently being processed.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Run one pass over the undelivered events.
    ///
    /// Fails only when the fetch fails; a failed save is logged and counted.
    pub async fn crawl_once(&self) -> CrawlerResult<CrawlReport> {
        let events = self.store.fetch_undelivered(self.config.batch_size).await?;
        let mut report = CrawlReport {
            fetched: events.len(),
            ..Default::default()
        };
        if events.is_empty() {
            return Ok(report);
        }

        debug!(fetched = report.fetched, "Crawling outbox");

        let outcomes: Vec<(EventId, CrawlerResult<EventOutcome>)> = stream::iter(events)
            .map(|event| async move {
                let event_id = event.id().clone();
                (event_id, self.process_event(event).await)
            })
            .buffer_unordered(self.config.max_concurrent_events)
            .collect()
            .await;

        for (event_id, outcome) in outcomes {
            match outcome {
                Ok(EventOutcome::Delivered) => report.delivered += 1,
                Ok(EventOutcome::PartiallyFailed) => report.partially_failed += 1,
                Ok(EventOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!(event_id = %event_id, error = %e, "Failed to record publication");
                    report.save_errors += 1;
                }
            }
        }

        Ok(report)
    }

    /// Deliver one event and save the resulting publication.
    pub async fn process_event(&self, event: DomainEvent) -> CrawlerResult<EventOutcome> {
        if event.was_quarantined() {
            debug!(event_id = %event.id(), "Skipping quarantined event");
            return Ok(EventOutcome::Skipped);
        }
        if event.is_delivered() {
            return Ok(EventOutcome::Skipped);
        }
        let Some(_claim) = self.claim(event.id()) else {
            debug!(event_id = %event.id(), "Event already in flight");
            return Ok(EventOutcome::Skipped);
        };

        let subscribers = self.router.subscribers_for(event.topic());
        let targets: Vec<Arc<dyn Subscriber>> = match event.subscriptions_to_retry() {
            None => subscribers,
            Some(failed) => subscribers
                .into_iter()
                .filter(|subscriber| failed.contains(&subscriber.subscription_id()))
                .collect(),
        };

        let failures: Vec<SubscriberFailure> = join_all(
            targets
                .iter()
                .map(|subscriber| self.call_subscriber(subscriber.as_ref(), &event)),
        )
        .await
        .into_iter()
        .flatten()
        .collect();

        let publication = Publication {
            published_at: self.publication_time(&event),
            failures,
        };
        let outcome = if publication.is_success() {
            EventOutcome::Delivered
        } else {
            EventOutcome::PartiallyFailed
        };
        let failed = publication.failures.len();

        let next = event.with_publication(publication);
        self.store.save(&next).await?;

        info!(
            event_id = %next.id(),
            topic = %next.topic(),
            attempt = next.publications().len(),
            subscribers = targets.len(),
            failed,
            "Published event"
        );
        Ok(outcome)
    }

    /// Poll until `shutdown` turns true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "Outbox crawler started"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    match self.crawl_once().await {
                        Ok(report) if report.fetched > 0 => info!(
                            fetched = report.fetched,
                            delivered = report.delivered,
                            partially_failed = report.partially_failed,
                            skipped = report.skipped,
                            save_errors = report.save_errors,
                            "Crawl pass complete"
                        ),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Crawl pass failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Outbox crawler stopped");
    }

    fn claim(&self, event_id: &EventId) -> Option<InFlightClaim<'_>> {
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(event_id.clone()) {
            return None;
        }
        Some(InFlightClaim {
            in_flight: &self.in_flight,
            event_id: event_id.clone(),
        })
    }

    /// Publication times never go backwards within an event.
    fn publication_time(&self, event: &DomainEvent) -> chrono::DateTime<chrono::Utc> {
        let now = self.clock.now();
        match event.latest_publication() {
            Some(latest) if latest.published_at > now => latest.published_at,
            _ => now,
        }
    }

    async fn call_subscriber(
        &self,
        subscriber: &dyn Subscriber,
        event: &DomainEvent,
    ) -> Option<SubscriberFailure> {
        let subscription_id = subscriber.subscription_id();
        let call = AssertUnwindSafe(subscriber.handle(event)).catch_unwind();

        let error_message = match tokio::time::timeout(self.config.subscriber_timeout, call).await {
            Ok(Ok(Ok(()))) => return None,
            Ok(Ok(Err(e))) => format!("{e:#}"),
            Ok(Err(_)) => "subscriber panicked".to_string(),
            Err(_) => format!(
                "timed out after {}ms",
                self.config.subscriber_timeout.as_millis()
            ),
        };

        warn!(
            event_id = %event.id(),
            subscription_id = %subscription_id,
            error = %error_message,
            "Subscriber failed"
        );
        Some(SubscriberFailure {
            subscription_id,
            error_message,
        })
    }
}
