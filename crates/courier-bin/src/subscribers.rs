//! Subscribers wired into the binary.

use async_trait::async_trait;
use courier_crawler::{StaticRouter, Subscriber};
use courier_domain::{DomainEvent, SubscriptionId, Topic};
use std::sync::Arc;
use tracing::info;

/// Records every delivered event in the central log.
pub struct AuditLogSubscriber;

#[async_trait]
impl Subscriber for AuditLogSubscriber {
    fn subscription_id(&self) -> SubscriptionId {
        SubscriptionId::from("audit-log")
    }

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        info!(
            event_id = %event.id(),
            topic = %event.topic(),
            occurred_at = %event.occurred_at(),
            attempt = event.publications().len() + 1,
            "Audit: event published"
        );
        Ok(())
    }
}

/// Router used by `courier crawl`.
pub fn router() -> StaticRouter {
    let audit: Arc<dyn Subscriber> = Arc::new(AuditLogSubscriber);
    let mut router = StaticRouter::new();
    for topic in Topic::ALL {
        router.subscribe(topic, audit.clone());
    }
    router
}
