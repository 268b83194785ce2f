//! Product commands and queries.

use std::sync::Arc;

use common::AggregateId;

use crate::aggregate::Aggregate;
use crate::command::CommandExecutor;
use crate::context::CommandContext;
use crate::error::DomainError;
use crate::uow::{UnitOfWork, UnitOfWorkExt, UnitOfWorkFactory};

use super::{CreateProduct, Product, RestockProduct};

/// Service for the product catalog.
pub struct ProductService<F: UnitOfWorkFactory> {
    executor: Arc<CommandExecutor<F>>,
}

impl<F: UnitOfWorkFactory> ProductService<F> {
    pub fn new(executor: Arc<CommandExecutor<F>>) -> Self {
        Self { executor }
    }

    /// Adds a product to the catalog.
    #[tracing::instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id()))]
    pub async fn create_product(
        &self,
        ctx: &CommandContext,
        cmd: CreateProduct,
    ) -> Result<Product, DomainError> {
        let mut product = self
            .executor
            .execute(ctx, move |uow| Box::pin(create(uow, cmd)))
            .await?;
        self.executor.publish(ctx, &mut product).await?;
        Ok(product)
    }

    /// Adds stock to a product.
    #[tracing::instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id()))]
    pub async fn restock_product(
        &self,
        ctx: &CommandContext,
        cmd: RestockProduct,
    ) -> Result<Product, DomainError> {
        let mut product = self
            .executor
            .execute(ctx, move |uow| Box::pin(restock(uow, cmd)))
            .await?;
        self.executor.publish(ctx, &mut product).await?;
        Ok(product)
    }

    /// Loads a product.
    pub async fn get_product(
        &self,
        ctx: &CommandContext,
        id: AggregateId,
    ) -> Result<Product, DomainError> {
        self.executor
            .query(ctx, move |uow| Box::pin(load(uow, id)))
            .await
    }
}

pub(crate) async fn load<U: UnitOfWork>(
    uow: &mut U,
    id: AggregateId,
) -> Result<Product, DomainError> {
    uow.products()?
        .find(id)
        .await?
        .ok_or_else(|| DomainError::not_found::<Product>(id))
}

pub(crate) async fn persist<U: UnitOfWork>(
    uow: &mut U,
    product: &mut Product,
) -> Result<(), DomainError> {
    product.validate()?;
    let events = product.events().to_vec();
    uow.products()?.save(product).await?;
    uow.record_events(&events).await?;
    Ok(())
}

async fn create<U: UnitOfWork>(uow: &mut U, cmd: CreateProduct) -> Result<Product, DomainError> {
    let mut product = Product::create(
        AggregateId::new(),
        &cmd.name,
        &cmd.description,
        cmd.price,
        cmd.stock,
    )?;
    persist(uow, &mut product).await?;
    Ok(product)
}

async fn restock<U: UnitOfWork>(uow: &mut U, cmd: RestockProduct) -> Result<Product, DomainError> {
    let mut product = load(uow, cmd.product_id).await?;
    product.add_stock(cmd.quantity)?;
    persist(uow, &mut product).await?;
    Ok(product)
}
