//! Event type to bus topic mapping.
//!
//! The relay, the in-process publisher and the subscribers all resolve topics
//! through one [`TopicRegistry`], so they always agree.

use std::collections::BTreeMap;

/// Default topic for every event type the domain emits.
pub const DEFAULT_TOPICS: &[(&str, &str)] = &[
    ("UserCreated", "user.created"),
    ("UserProfileUpdated", "user.profile.updated"),
    ("UserPasswordChanged", "user.password.changed"),
    ("MessageCreated", "chat.message.created"),
    ("MessageRead", "chat.message.read"),
    ("ProductCreated", "product.created"),
    ("ProductStockUpdated", "product.stock.updated"),
    ("OrderCreated", "order.created"),
    ("OrderItemAdded", "order.item.added"),
    ("OrderConfirmed", "order.confirmed"),
    ("OrderCancelled", "order.cancelled"),
];

/// Maps event types to topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRegistry {
    topics: BTreeMap<String, String>,
}

impl TopicRegistry {
    /// Creates a registry holding the default topics.
    pub fn new() -> Self {
        Self {
            topics: DEFAULT_TOPICS
                .iter()
                .map(|(event_type, topic)| (event_type.to_string(), topic.to_string()))
                .collect(),
        }
    }

    /// Routes an event type to a different topic, or registers a new one.
    pub fn with_override(mut self, event_type: impl Into<String>, topic: impl Into<String>) -> Self {
        self.topics.insert(event_type.into(), topic.into());
        self
    }

    /// Applies several overrides.
    pub fn with_overrides<I, K, V>(self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        overrides
            .into_iter()
            .fold(self, |registry, (event_type, topic)| {
                registry.with_override(event_type, topic)
            })
    }

    /// Returns the topic for an event type.
    pub fn topic_for(&self, event_type: &str) -> Option<&str> {
        self.topics.get(event_type).map(String::as_str)
    }

    /// Returns the distinct topics, sorted.
    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.topics.values().map(String::as_str).collect();
        topics.sort_unstable();
        topics.dedup();
        topics
    }

    /// Returns `(event_type, topic)` pairs sorted by event type.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.topics.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::new()
    }
}
