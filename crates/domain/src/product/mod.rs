//! Product catalog aggregate with stock tracking.

mod aggregate;
mod commands;
mod events;
mod service;

pub(crate) use service::{load as load_product, persist as persist_product};

pub use aggregate::Product;
pub use commands::{CreateProduct, RestockProduct};
pub use events::{ProductCreatedData, ProductEvent, ProductStockUpdatedData};
pub use service::ProductService;

use common::AggregateId;
use thiserror::Error;

/// Maximum length of a product name.
pub const MAX_PRODUCT_NAME_LEN: usize = 200;

/// Errors that can occur during product operations.
#[derive(Debug, Error)]
pub enum ProductError {
    /// The product name is empty or too long.
    #[error("Invalid product name: must be 1 to {MAX_PRODUCT_NAME_LEN} characters")]
    InvalidName,

    /// Prices must be positive.
    #[error("Invalid price: {0} cents")]
    InvalidPrice(i64),

    /// Stock changes must be positive.
    #[error("Invalid quantity: must be greater than zero")]
    InvalidQuantity,

    /// Not enough stock to fulfil a request.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: AggregateId,
        requested: u32,
        available: u32,
    },
}

impl ProductError {
    /// Stable code for client display.
    pub fn code(&self) -> &'static str {
        match self {
            ProductError::InvalidName => "invalid_product_name",
            ProductError::InvalidPrice(_) => "invalid_price",
            ProductError::InvalidQuantity => "invalid_quantity",
            ProductError::InsufficientStock { .. } => "insufficient_stock",
        }
    }
}
