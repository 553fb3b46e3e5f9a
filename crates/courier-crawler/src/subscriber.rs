//! Subscriber and routing contracts.
//!
//! Which subscribers listen to which topic is decided by the application
//! wiring, not by the crawler; [`StaticRouter`] is the plain map version.

use async_trait::async_trait;
use courier_domain::{DomainEvent, SubscriptionId, Topic};
use std::collections::HashMap;
use std::sync::Arc;

/// A side effect triggered by an event (send an email, call a partner API, ...).
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Stable identifier recorded in publication failures.
    fn subscription_id(&self) -> SubscriptionId;

    /// Performs the side effect. Any error is recorded as a failure of
    /// this subscription for the current publication.
    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()>;
}

/// Maps a topic to the subscribers interested in it.
pub trait SubscriptionRouter: Send + Sync {
    fn subscribers_for(&self, topic: Topic) -> Vec<Arc<dyn Subscriber>>;
}

/// Map-backed router.
#[derive(Default, Clone)]
pub struct StaticRouter {
    routes: HashMap<Topic, Vec<Arc<dyn Subscriber>>>,
}

impl StaticRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `subscriber` for `topic`. Registering the same
    /// subscription id twice on a topic replaces the earlier one.
    pub fn subscribe(&mut self, topic: Topic, subscriber: Arc<dyn Subscriber>) -> &mut Self {
        let subscribers = self.routes.entry(topic).or_default();
        let id = subscriber.subscription_id();
        subscribers.retain(|existing| existing.subscription_id() != id);
        subscribers.push(subscriber);
        self
    }

    pub fn with_subscriber(mut self, topic: Topic, subscriber: Arc<dyn Subscriber>) -> Self {
        self.subscribe(topic, subscriber);
        self
    }

    /// Topics with at least one subscriber.
    pub fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self
            .routes
            .iter()
            .filter(|(_, subscribers)| !subscribers.is_empty())
            .map(|(topic, _)| *topic)
            .collect();
        topics.sort();
        topics
    }
}

impl SubscriptionRouter for StaticRouter {
    fn subscribers_for(&self, topic: Topic) -> Vec<Arc<dyn Subscriber>> {
        self.routes.get(&topic).cloned().unwrap_or_default()
    }
}

impl std::fmt::Debug for StaticRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let routes: HashMap<&Topic, Vec<SubscriptionId>> = self
            .routes
            .iter()
            .map(|(topic, subs)| (topic, subs.iter().map(|s| s.subscription_id()).collect()))
            .collect();
        f.debug_struct("StaticRouter").field("routes", &routes).finish()
    }
}
