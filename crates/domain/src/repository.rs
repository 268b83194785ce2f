//! Repository traits, one per aggregate.
//!
//! Handles are obtained from a [`UnitOfWork`](crate::uow::UnitOfWork) and
//! borrow it, so every read and write happens inside its transaction.
//! `save` checks the aggregate's version against the stored one, fails with
//! `ConcurrencyConflict` when they differ, and bumps the version on success.

use async_trait::async_trait;
use common::AggregateId;

use crate::chat::Message;
use crate::order::Order;
use crate::product::Product;
use crate::uow::UnitOfWorkError;
use crate::user::{Email, User};

#[async_trait]
pub trait UserRepository: Send {
    async fn find(&mut self, id: AggregateId) -> Result<Option<User>, UnitOfWorkError>;

    async fn find_by_email(&mut self, email: &Email) -> Result<Option<User>, UnitOfWorkError>;

    async fn save(&mut self, user: &mut User) -> Result<(), UnitOfWorkError>;
}

#[async_trait]
pub trait MessageRepository: Send {
    async fn find(&mut self, id: AggregateId) -> Result<Option<Message>, UnitOfWorkError>;

    async fn save(&mut self, message: &mut Message) -> Result<(), UnitOfWorkError>;
}

#[async_trait]
pub trait ProductRepository: Send {
    async fn find(&mut self, id: AggregateId) -> Result<Option<Product>, UnitOfWorkError>;

    async fn save(&mut self, product: &mut Product) -> Result<(), UnitOfWorkError>;
}

#[async_trait]
pub trait OrderRepository: Send {
    async fn find(&mut self, id: AggregateId) -> Result<Option<Order>, UnitOfWorkError>;

    async fn save(&mut self, order: &mut Order) -> Result<(), UnitOfWorkError>;
}
