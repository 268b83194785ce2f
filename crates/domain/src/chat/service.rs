//! Chat commands and queries.

use std::sync::Arc;

use common::AggregateId;

use crate::aggregate::Aggregate;
use crate::command::CommandExecutor;
use crate::context::CommandContext;
use crate::error::DomainError;
use crate::uow::{UnitOfWork, UnitOfWorkExt, UnitOfWorkFactory};

use super::{CreateMessage, MarkMessageRead, Message};

/// Service for sending and reading direct messages.
pub struct ChatService<F: UnitOfWorkFactory> {
    executor: Arc<CommandExecutor<F>>,
}

impl<F: UnitOfWorkFactory> ChatService<F> {
    pub fn new(executor: Arc<CommandExecutor<F>>) -> Self {
        Self { executor }
    }

    /// Sends a message.
    #[tracing::instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id()))]
    pub async fn create_message(
        &self,
        ctx: &CommandContext,
        cmd: CreateMessage,
    ) -> Result<Message, DomainError> {
        let mut message = self
            .executor
            .execute(ctx, move |uow| Box::pin(create(uow, cmd)))
            .await?;
        self.executor.publish(ctx, &mut message).await?;
        Ok(message)
    }

    /// Marks a message read. Reading an already read message changes nothing.
    #[tracing::instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id()))]
    pub async fn mark_read(
        &self,
        ctx: &CommandContext,
        cmd: MarkMessageRead,
    ) -> Result<Message, DomainError> {
        let mut message = self
            .executor
            .execute(ctx, move |uow| Box::pin(mark_read(uow, cmd)))
            .await?;
        self.executor.publish(ctx, &mut message).await?;
        Ok(message)
    }

    /// Loads a message.
    pub async fn get_message(
        &self,
        ctx: &CommandContext,
        id: AggregateId,
    ) -> Result<Message, DomainError> {
        self.executor
            .query(ctx, move |uow| Box::pin(load(uow, id)))
            .await
    }
}

async fn load<U: UnitOfWork>(uow: &mut U, id: AggregateId) -> Result<Message, DomainError> {
    uow.messages()?
        .find(id)
        .await?
        .ok_or_else(|| DomainError::not_found::<Message>(id))
}

async fn persist<U: UnitOfWork>(uow: &mut U, message: &mut Message) -> Result<(), DomainError> {
    message.validate()?;
    let events = message.events().to_vec();
    uow.messages()?.save(message).await?;
    uow.record_events(&events).await?;
    Ok(())
}

async fn create<U: UnitOfWork>(uow: &mut U, cmd: CreateMessage) -> Result<Message, DomainError> {
    let mut message = Message::create(
        AggregateId::new(),
        cmd.sender_id,
        cmd.receiver_id,
        &cmd.content,
    )?;
    persist(uow, &mut message).await?;
    Ok(message)
}

async fn mark_read<U: UnitOfWork>(
    uow: &mut U,
    cmd: MarkMessageRead,
) -> Result<Message, DomainError> {
    let mut message = load(uow, cmd.message_id).await?;
    if message.mark_read(cmd.reader_id)? {
        persist(uow, &mut message).await?;
    }
    Ok(message)
}
