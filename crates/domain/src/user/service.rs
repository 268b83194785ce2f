//! User commands and queries.

use std::sync::Arc;

use common::AggregateId;

use crate::aggregate::Aggregate;
use crate::command::CommandExecutor;
use crate::context::CommandContext;
use crate::error::DomainError;
use crate::uow::{BoxError, UnitOfWork, UnitOfWorkExt, UnitOfWorkFactory};

use super::{
    ChangePassword, Email, MIN_PASSWORD_LEN, RegisterUser, UpdateProfile, User, UserError,
};

/// Hashes plain-text passwords. Provided by the authentication layer.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, BoxError>;
}

/// Service for managing users.
pub struct UserService<F: UnitOfWorkFactory> {
    executor: Arc<CommandExecutor<F>>,
    hasher: Arc<dyn PasswordHasher>,
}

impl<F: UnitOfWorkFactory> UserService<F> {
    pub fn new(executor: Arc<CommandExecutor<F>>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { executor, hasher }
    }

    /// Registers a user; the email must not be taken.
    #[tracing::instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id()))]
    pub async fn register_user(
        &self,
        ctx: &CommandContext,
        cmd: RegisterUser,
    ) -> Result<User, DomainError> {
        let password_hash = self.hash_password(&cmd.password)?;

        let mut user = self
            .executor
            .execute(ctx, move |uow| {
                Box::pin(register(uow, cmd.email, cmd.name, password_hash))
            })
            .await?;
        self.executor.publish(ctx, &mut user).await?;
        Ok(user)
    }

    /// Changes a user's display name.
    #[tracing::instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id()))]
    pub async fn update_profile(
        &self,
        ctx: &CommandContext,
        cmd: UpdateProfile,
    ) -> Result<User, DomainError> {
        let mut user = self
            .executor
            .execute(ctx, move |uow| Box::pin(update_profile(uow, cmd)))
            .await?;
        self.executor.publish(ctx, &mut user).await?;
        Ok(user)
    }

    /// Replaces a user's password.
    #[tracing::instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id()))]
    pub async fn change_password(
        &self,
        ctx: &CommandContext,
        cmd: ChangePassword,
    ) -> Result<User, DomainError> {
        let password_hash = self.hash_password(&cmd.new_password)?;
        let user_id = cmd.user_id;

        let mut user = self
            .executor
            .execute(ctx, move |uow| {
                Box::pin(change_password(uow, user_id, password_hash))
            })
            .await?;
        self.executor.publish(ctx, &mut user).await?;
        Ok(user)
    }

    /// Loads a user.
    pub async fn get_user(&self, ctx: &CommandContext, id: AggregateId) -> Result<User, DomainError> {
        self.executor
            .query(ctx, move |uow| Box::pin(load(uow, id)))
            .await
    }

    fn hash_password(&self, password: &str) -> Result<String, DomainError> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(UserError::WeakPassword.into());
        }
        self.hasher
            .hash(password)
            .map_err(DomainError::PasswordHashing)
    }
}

async fn load<U: UnitOfWork>(uow: &mut U, id: AggregateId) -> Result<User, DomainError> {
    uow.users()?
        .find(id)
        .await?
        .ok_or_else(|| DomainError::not_found::<User>(id))
}

async fn persist<U: UnitOfWork>(uow: &mut U, user: &mut User) -> Result<(), DomainError> {
    user.validate()?;
    let events = user.events().to_vec();
    uow.users()?.save(user).await?;
    uow.record_events(&events).await?;
    Ok(())
}

async fn register<U: UnitOfWork>(
    uow: &mut U,
    email: String,
    name: String,
    password_hash: String,
) -> Result<User, DomainError> {
    let normalized = Email::parse(&email)?;
    if uow.users()?.find_by_email(&normalized).await?.is_some() {
        return Err(UserError::EmailTaken(normalized.to_string()).into());
    }

    let mut user = User::register(AggregateId::new(), &email, &name, password_hash)?;
    persist(uow, &mut user).await?;
    Ok(user)
}

async fn update_profile<U: UnitOfWork>(
    uow: &mut U,
    cmd: UpdateProfile,
) -> Result<User, DomainError> {
    let mut user = load(uow, cmd.user_id).await?;
    user.update_profile(&cmd.name)?;
    persist(uow, &mut user).await?;
    Ok(user)
}

async fn change_password<U: UnitOfWork>(
    uow: &mut U,
    user_id: AggregateId,
    password_hash: String,
) -> Result<User, DomainError> {
    let mut user = load(uow, user_id).await?;
    user.change_password(password_hash)?;
    persist(uow, &mut user).await?;
    Ok(user)
}
