//! Product commands.

use common::AggregateId;

use crate::order::Money;

/// Command to add a product to the catalog.
#[derive(Debug, Clone)]
pub struct CreateProduct {
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: u32,
}

impl CreateProduct {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        price: Money,
        stock: u32,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            price,
            stock,
        }
    }
}

/// Command to add stock to a product.
#[derive(Debug, Clone)]
pub struct RestockProduct {
    pub product_id: AggregateId,
    pub quantity: u32,
}

impl RestockProduct {
    pub fn new(product_id: AggregateId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}
