//! In-process event dispatcher.
//!
//! Handlers run after commit, in registration order. A handler failure never
//! undoes the transaction; what happens to it is decided by the caller's
//! [`DispatchPolicy`](crate::command::DispatchPolicy).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::aggregate::DomainEvent;
use crate::context::CommandContext;
use crate::event::Event;
use crate::uow::BoxError;

/// A handler failed while processing a committed event.
#[derive(Debug, Error)]
#[error("Handler {handler} failed on {event_type}: {source}")]
pub struct DispatchError {
    pub handler: &'static str,
    pub event_type: &'static str,
    #[source]
    pub source: BoxError,
}

/// Reacts to committed domain events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Returns the name of this handler, used in logs and errors.
    fn name(&self) -> &'static str;

    /// Handles one event.
    async fn handle(&self, ctx: &CommandContext, event: &Event) -> Result<(), BoxError>;
}

/// Routes events to the handlers registered for their type.
///
/// Registration takes `&mut self`; share the dispatcher behind an `Arc` once
/// it is set up.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<&'static str, Vec<Arc<dyn EventHandler>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for an event type.
    pub fn register_handler(&mut self, event_type: &'static str, handler: Arc<dyn EventHandler>) {
        self.handlers.entry(event_type).or_default().push(handler);
    }

    /// Returns the number of handlers registered for an event type.
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers.get(event_type).map_or(0, Vec::len)
    }

    /// Invokes every handler for the event's type in registration order,
    /// stopping at the first error.
    #[tracing::instrument(skip(self, ctx, event), fields(event_type = %event.event_type(), aggregate_id = %event.aggregate_id()))]
    pub async fn dispatch(&self, ctx: &CommandContext, event: &Event) -> Result<(), DispatchError> {
        let event_type = event.event_type();
        let Some(handlers) = self.handlers.get(event_type) else {
            tracing::debug!("no handlers registered");
            return Ok(());
        };

        for handler in handlers {
            if let Err(source) = handler.handle(ctx, event).await {
                metrics::counter!("dispatch_handler_failures_total", "handler" => handler.name())
                    .increment(1);
                return Err(DispatchError {
                    handler: handler.name(),
                    event_type,
                    source,
                });
            }
        }
        Ok(())
    }

    /// Dispatches events in order, stopping at the first error.
    pub async fn dispatch_all(
        &self,
        ctx: &CommandContext,
        events: &[Event],
    ) -> Result<(), DispatchError> {
        for event in events {
            self.dispatch(ctx, event).await?;
        }
        Ok(())
    }
}
