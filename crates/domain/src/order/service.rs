//! Order commands and queries.
//!
//! Confirming and cancelling touch the order and its products in one unit of
//! work, so stock and order status always change together.

use std::sync::Arc;

use common::AggregateId;

use crate::aggregate::Aggregate;
use crate::command::{CommandExecutor, drain_events};
use crate::context::CommandContext;
use crate::error::DomainError;
use crate::product::{Product, load_product, persist_product};
use crate::uow::{UnitOfWork, UnitOfWorkExt, UnitOfWorkFactory};

use super::{
    AddItem, CancelOrder, ConfirmOrder, CreateOrder, Order, OrderItem, OrderLine, OrderStatus,
};

/// Service for managing orders.
pub struct OrderService<F: UnitOfWorkFactory> {
    executor: Arc<CommandExecutor<F>>,
}

impl<F: UnitOfWorkFactory> OrderService<F> {
    pub fn new(executor: Arc<CommandExecutor<F>>) -> Self {
        Self { executor }
    }

    /// Creates a draft order, optionally with initial items priced from the
    /// products.
    #[tracing::instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id()))]
    pub async fn create_order(
        &self,
        ctx: &CommandContext,
        cmd: CreateOrder,
    ) -> Result<Order, DomainError> {
        let mut order = self
            .executor
            .execute(ctx, move |uow| Box::pin(create(uow, cmd)))
            .await?;
        self.executor.publish(ctx, &mut order).await?;
        Ok(order)
    }

    /// Adds an item to a draft order at the product's current price.
    #[tracing::instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id()))]
    pub async fn add_item(&self, ctx: &CommandContext, cmd: AddItem) -> Result<Order, DomainError> {
        let mut order = self
            .executor
            .execute(ctx, move |uow| Box::pin(add_item(uow, cmd)))
            .await?;
        self.executor.publish(ctx, &mut order).await?;
        Ok(order)
    }

    /// Confirms an order and takes the stock for every item.
    ///
    /// Stock is checked for every product before anything is changed; one
    /// short product fails the whole command.
    #[tracing::instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id()))]
    pub async fn confirm_order(
        &self,
        ctx: &CommandContext,
        cmd: ConfirmOrder,
    ) -> Result<Order, DomainError> {
        let (order, products) = self
            .executor
            .execute(ctx, move |uow| Box::pin(confirm(uow, cmd.order_id)))
            .await?;
        self.publish_with_products(ctx, order, products).await
    }

    /// Cancels an order, returning stock if it had been confirmed.
    #[tracing::instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id()))]
    pub async fn cancel_order(
        &self,
        ctx: &CommandContext,
        cmd: CancelOrder,
    ) -> Result<Order, DomainError> {
        let (order, products) = self
            .executor
            .execute(ctx, move |uow| Box::pin(cancel(uow, cmd.order_id)))
            .await?;
        self.publish_with_products(ctx, order, products).await
    }

    /// Loads an order.
    pub async fn get_order(&self, ctx: &CommandContext, id: AggregateId) -> Result<Order, DomainError> {
        self.executor
            .query(ctx, move |uow| Box::pin(load(uow, id)))
            .await
    }

    async fn publish_with_products(
        &self,
        ctx: &CommandContext,
        mut order: Order,
        mut products: Vec<Product>,
    ) -> Result<Order, DomainError> {
        let mut events = drain_events(&mut order);
        for product in &mut products {
            events.extend(drain_events(product));
        }
        self.executor.after_commit(ctx, events).await?;
        Ok(order)
    }
}

async fn load<U: UnitOfWork>(uow: &mut U, id: AggregateId) -> Result<Order, DomainError> {
    uow.orders()?
        .find(id)
        .await?
        .ok_or_else(|| DomainError::not_found::<Order>(id))
}

async fn persist<U: UnitOfWork>(uow: &mut U, order: &mut Order) -> Result<(), DomainError> {
    order.validate()?;
    let events = order.events().to_vec();
    uow.orders()?.save(order).await?;
    uow.record_events(&events).await?;
    Ok(())
}

async fn price_line<U: UnitOfWork>(uow: &mut U, line: OrderLine) -> Result<OrderItem, DomainError> {
    let product = load_product(uow, line.product_id).await?;
    Ok(OrderItem::new(line.product_id, line.quantity, product.price())?)
}

async fn create<U: UnitOfWork>(uow: &mut U, cmd: CreateOrder) -> Result<Order, DomainError> {
    let mut items = Vec::with_capacity(cmd.lines.len());
    for line in cmd.lines {
        items.push(price_line(uow, line).await?);
    }

    let mut order = Order::create(AggregateId::new(), cmd.user_id, items)?;
    persist(uow, &mut order).await?;
    Ok(order)
}

async fn add_item<U: UnitOfWork>(uow: &mut U, cmd: AddItem) -> Result<Order, DomainError> {
    let mut order = load(uow, cmd.order_id).await?;
    let item = price_line(uow, cmd.line).await?;
    order.add_item(item)?;
    persist(uow, &mut order).await?;
    Ok(order)
}

async fn confirm<U: UnitOfWork>(
    uow: &mut U,
    order_id: AggregateId,
) -> Result<(Order, Vec<Product>), DomainError> {
    let mut order = load(uow, order_id).await?;
    let required = order.required_stock();

    let mut products = Vec::with_capacity(required.len());
    for (product_id, quantity) in &required {
        let product = load_product(uow, *product_id).await?;
        product.ensure_available(*quantity)?;
        products.push(product);
    }

    order.confirm()?;
    for product in &mut products {
        let quantity = required[&product.id()];
        product.remove_stock(quantity)?;
    }

    persist(uow, &mut order).await?;
    for product in &mut products {
        persist_product(uow, product).await?;
    }
    Ok((order, products))
}

async fn cancel<U: UnitOfWork>(
    uow: &mut U,
    order_id: AggregateId,
) -> Result<(Order, Vec<Product>), DomainError> {
    let mut order = load(uow, order_id).await?;
    let previous = order.cancel()?;

    let mut products = Vec::new();
    if previous == OrderStatus::Confirmed {
        for (product_id, quantity) in order.required_stock() {
            let mut product = load_product(uow, product_id).await?;
            product.add_stock(quantity)?;
            products.push(product);
        }
    }

    persist(uow, &mut order).await?;
    for product in &mut products {
        persist_product(uow, product).await?;
    }
    Ok((order, products))
}
