//! Command execution: one unit of work per command, post-commit dispatch.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::aggregate::Aggregate;
use crate::context::CommandContext;
use crate::dispatch::EventDispatcher;
use crate::error::DomainError;
use crate::event::Event;
use crate::uow::{UnitOfWork, UnitOfWorkFactory};

/// What to do with in-process handlers after a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchPolicy {
    /// Do not dispatch; the outbox relay is the only delivery path.
    #[default]
    Disabled,

    /// Dispatch and log handler failures without failing the command.
    BestEffort,

    /// Dispatch and return handler failures to the caller. The transaction is
    /// committed either way.
    Required,
}

/// Runs commands against units of work from a factory.
///
/// For every command:
/// 1. begin a unit of work
/// 2. let the command load aggregates, mutate them and stage their events
///    through repositories and `record_events`
/// 3. commit, or roll back on any error
/// 4. after a successful commit only, clear the aggregates' buffers and hand
///    the events to the dispatcher according to the [`DispatchPolicy`]
///
/// Steps 1 to 3 run under the context's deadline.
pub struct CommandExecutor<F: UnitOfWorkFactory> {
    factory: F,
    dispatcher: Arc<EventDispatcher>,
    policy: DispatchPolicy,
}

impl<F: UnitOfWorkFactory> CommandExecutor<F> {
    /// Creates an executor that does not dispatch in process.
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            dispatcher: Arc::new(EventDispatcher::new()),
            policy: DispatchPolicy::Disabled,
        }
    }

    /// Sets the dispatcher used after commit.
    pub fn with_dispatcher(mut self, dispatcher: Arc<EventDispatcher>, policy: DispatchPolicy) -> Self {
        self.dispatcher = dispatcher;
        self.policy = policy;
        self
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    /// Runs `stage` in a new unit of work and commits it.
    ///
    /// Any error from `stage` rolls the unit of work back and is returned
    /// unchanged.
    pub async fn execute<T, Stage>(&self, ctx: &CommandContext, stage: Stage) -> Result<T, DomainError>
    where
        T: Send,
        Stage: for<'u> FnOnce(&'u mut F::Uow) -> BoxFuture<'u, Result<T, DomainError>> + Send,
    {
        self.within_deadline(ctx, async {
            let mut uow = self.begin(ctx).await?;
            let staged = stage(&mut uow).await;
            self.finish(uow, staged).await
        })
        .await
    }

    /// Runs a read in a unit of work that is always rolled back.
    pub async fn query<T, Stage>(&self, ctx: &CommandContext, stage: Stage) -> Result<T, DomainError>
    where
        T: Send,
        Stage: for<'u> FnOnce(&'u mut F::Uow) -> BoxFuture<'u, Result<T, DomainError>> + Send,
    {
        self.within_deadline(ctx, async {
            let mut uow = self.begin(ctx).await?;
            let result = stage(&mut uow).await;
            if let Err(e) = uow.rollback().await {
                tracing::warn!(error = %e, "read transaction rollback failed");
            }
            result
        })
        .await
    }

    /// Clears the aggregate's buffer and dispatches its events.
    ///
    /// Call only after `execute` returned the committed aggregate.
    pub async fn publish<A>(&self, ctx: &CommandContext, aggregate: &mut A) -> Result<(), DomainError>
    where
        A: Aggregate,
        Event: From<A::Event>,
    {
        let events = drain_events(aggregate);
        self.after_commit(ctx, events).await
    }

    /// Hands committed events to the dispatcher according to the policy.
    pub async fn after_commit(&self, ctx: &CommandContext, events: Vec<Event>) -> Result<(), DomainError> {
        match self.policy {
            DispatchPolicy::Disabled => Ok(()),
            DispatchPolicy::BestEffort => {
                if let Err(e) = self.dispatcher.dispatch_all(ctx, &events).await {
                    tracing::warn!(error = %e, correlation_id = %ctx.correlation_id(), "post-commit handler failed");
                }
                Ok(())
            }
            DispatchPolicy::Required => {
                self.dispatcher.dispatch_all(ctx, &events).await?;
                Ok(())
            }
        }
    }

    async fn begin(&self, ctx: &CommandContext) -> Result<F::Uow, DomainError> {
        let uow = self.factory.begin(ctx).await?;
        Ok(uow)
    }

    async fn finish<T>(&self, mut uow: F::Uow, staged: Result<T, DomainError>) -> Result<T, DomainError> {
        match staged {
            Ok(value) => match uow.commit().await {
                Ok(()) => {
                    metrics::counter!("commands_committed_total").increment(1);
                    Ok(value)
                }
                Err(e) => {
                    metrics::counter!("commands_rolled_back_total").increment(1);
                    tracing::warn!(error = %e, "commit failed");
                    Err(e.into())
                }
            },
            Err(err) => {
                if let Err(e) = uow.rollback().await {
                    tracing::error!(error = %e, "rollback failed");
                }
                metrics::counter!("commands_rolled_back_total").increment(1);
                tracing::debug!(error = %err, "command rolled back");
                Err(err)
            }
        }
    }

    async fn within_deadline<T, Fut>(&self, ctx: &CommandContext, fut: Fut) -> Result<T, DomainError>
    where
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let Some(deadline) = ctx.deadline() else {
            return fut.await;
        };
        if ctx.is_expired() {
            return Err(DomainError::DeadlineExceeded);
        }

        // Dropping the timed-out future drops its unit of work, which rolls back.
        match tokio::time::timeout_at(deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(correlation_id = %ctx.correlation_id(), "command deadline exceeded");
                metrics::counter!("commands_rolled_back_total").increment(1);
                Err(DomainError::DeadlineExceeded)
            }
        }
    }
}

/// Takes the staged events out of a committed aggregate.
pub fn drain_events<A>(aggregate: &mut A) -> Vec<Event>
where
    A: Aggregate,
    Event: From<A::Event>,
{
    let events = aggregate.events().iter().cloned().map(Event::from).collect();
    aggregate.clear_events();
    events
}
