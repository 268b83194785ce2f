//! Product aggregate implementation.

use chrono::{DateTime, Utc};
use common::AggregateId;

use crate::aggregate::{Aggregate, EventBuffer};
use crate::order::Money;

use super::{
    MAX_PRODUCT_NAME_LEN, ProductError, ProductEvent,
    events::{ProductCreatedData, ProductStockUpdatedData},
};

/// Product aggregate root.
#[derive(Debug, Clone, Default)]
pub struct Product {
    id: AggregateId,
    version: i64,
    name: String,
    description: String,
    price: Money,
    stock: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    events: EventBuffer<ProductEvent>,
}

impl Aggregate for Product {
    type Event = ProductEvent;
    type Error = ProductError;

    fn aggregate_type() -> &'static str {
        "Product"
    }

    fn id(&self) -> AggregateId {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn validate(&self) -> Result<(), ProductError> {
        validate_name(&self.name)?;
        if !self.price.is_positive() {
            return Err(ProductError::InvalidPrice(self.price.cents()));
        }
        Ok(())
    }

    fn apply(&mut self, event: &ProductEvent) {
        match event {
            ProductEvent::ProductCreated(data) => {
                self.id = data.product_id;
                self.name = data.name.clone();
                self.description = data.description.clone();
                self.price = data.price;
                self.stock = data.stock;
                self.created_at = data.created_at;
                self.updated_at = data.created_at;
            }
            ProductEvent::ProductStockUpdated(data) => {
                self.stock = data.new_stock;
                self.updated_at = data.updated_at;
            }
        }
    }

    fn events(&self) -> &[ProductEvent] {
        self.events.events()
    }

    fn clear_events(&mut self) {
        self.events.clear();
    }
}

fn validate_name(name: &str) -> Result<String, ProductError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_PRODUCT_NAME_LEN {
        return Err(ProductError::InvalidName);
    }
    Ok(name.to_string())
}

// Query methods
impl Product {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn price(&self) -> Money {
        self.price
    }

    pub fn stock(&self) -> u32 {
        self.stock
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Fails with `InsufficientStock` unless `quantity` units are available.
    pub fn ensure_available(&self, quantity: u32) -> Result<(), ProductError> {
        if quantity > self.stock {
            return Err(ProductError::InsufficientStock {
                product_id: self.id,
                requested: quantity,
                available: self.stock,
            });
        }
        Ok(())
    }
}

// Command methods (stage events)
impl Product {
    /// Adds a product to the catalog, staging `ProductCreated`.
    pub fn create(
        id: AggregateId,
        name: &str,
        description: &str,
        price: Money,
        stock: u32,
    ) -> Result<Self, ProductError> {
        let name = validate_name(name)?;
        if !price.is_positive() {
            return Err(ProductError::InvalidPrice(price.cents()));
        }

        let mut product = Product::default();
        let event = ProductEvent::ProductCreated(ProductCreatedData {
            product_id: id,
            name,
            description: description.trim().to_string(),
            price,
            stock,
            created_at: Utc::now(),
        });
        product.apply(&event);
        product.events.record(event);
        Ok(product)
    }

    /// Takes `quantity` units out of stock.
    pub fn remove_stock(&mut self, quantity: u32) -> Result<(), ProductError> {
        if quantity == 0 {
            return Err(ProductError::InvalidQuantity);
        }
        self.ensure_available(quantity)?;
        self.change_stock(self.stock - quantity);
        Ok(())
    }

    /// Puts `quantity` units back into stock.
    pub fn add_stock(&mut self, quantity: u32) -> Result<(), ProductError> {
        if quantity == 0 {
            return Err(ProductError::InvalidQuantity);
        }
        let new_stock = self
            .stock
            .checked_add(quantity)
            .ok_or(ProductError::InvalidQuantity)?;
        self.change_stock(new_stock);
        Ok(())
    }

    fn change_stock(&mut self, new_stock: u32) {
        let event = ProductEvent::ProductStockUpdated(ProductStockUpdatedData {
            product_id: self.id,
            old_stock: self.stock,
            new_stock,
            updated_at: Utc::now(),
        });
        self.apply(&event);
        self.events.record(event);
    }

    /// Rebuilds a product from its persisted row.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        id: AggregateId,
        version: i64,
        name: String,
        description: String,
        price: Money,
        stock: u32,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            version,
            name,
            description,
            price,
            stock,
            created_at,
            updated_at,
            events: EventBuffer::new(),
        }
    }
}
