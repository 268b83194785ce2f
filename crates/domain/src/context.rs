//! Per-command context: correlation, actor and deadline.

use std::time::Duration;

use common::AggregateId;
use tokio::time::Instant;
use uuid::Uuid;

/// Context carried by every command.
///
/// The deadline bounds everything before commit; the correlation id, actor
/// and source are recorded as event store metadata.
#[derive(Debug, Clone)]
pub struct CommandContext {
    correlation_id: Uuid,
    actor: Option<AggregateId>,
    source: Option<String>,
    deadline: Option<Instant>,
}

impl CommandContext {
    /// Creates a context with a fresh correlation id and no deadline.
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            actor: None,
            source: None,
            deadline: None,
        }
    }

    /// Continues an existing correlation.
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Sets the user performing the command.
    pub fn with_actor(mut self, actor: AggregateId) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Sets the originating component (e.g. a subscriber or an HTTP route).
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Sets an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn actor(&self) -> Option<AggregateId> {
        self.actor
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Metadata recorded with every event appended under this context.
    pub fn metadata(&self) -> serde_json::Value {
        let mut metadata = serde_json::json!({
            "correlation_id": self.correlation_id.to_string(),
        });
        if let Some(actor) = self.actor {
            metadata["actor"] = serde_json::Value::String(actor.to_string());
        }
        if let Some(source) = &self.source {
            metadata["source"] = serde_json::Value::String(source.clone());
        }
        metadata
    }
}

impl Default for CommandContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_includes_optional_fields_when_set() {
        let ctx = CommandContext::new();
        let metadata = ctx.metadata();
        assert_eq!(metadata["correlation_id"], ctx.correlation_id().to_string());
        assert!(metadata.get("actor").is_none());

        let actor = AggregateId::new();
        let ctx = ctx.with_actor(actor).with_source("chat-api");
        let metadata = ctx.metadata();
        assert_eq!(metadata["actor"], actor.to_string());
        assert_eq!(metadata["source"], "chat-api");
    }

    #[tokio::test]
    async fn expiry() {
        let ctx = CommandContext::new();
        assert!(!ctx.is_expired());

        let ctx = ctx.with_deadline(Instant::now());
        assert!(ctx.is_expired());

        let ctx = CommandContext::new().with_timeout(Duration::from_secs(60));
        assert!(!ctx.is_expired());
    }
}
