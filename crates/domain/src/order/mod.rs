//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;
mod state;
mod value_objects;

pub use aggregate::Order;
pub use commands::{AddItem, CancelOrder, ConfirmOrder, CreateOrder, OrderLine};
pub use events::{
    OrderCancelledData, OrderConfirmedData, OrderCreatedData, OrderEvent, OrderItemAddedData,
};
pub use service::OrderService;
pub use state::OrderStatus;
pub use value_objects::{Money, OrderItem};

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order is not in the expected status.
    #[error("Invalid state transition: cannot {action} from {current} status")]
    InvalidStateTransition {
        current: OrderStatus,
        action: &'static str,
    },

    /// Invalid quantity.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// Invalid price.
    #[error("Invalid price: {price} (must be greater than 0)")]
    InvalidPrice { price: i64 },

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,
}

impl OrderError {
    /// Stable code for client display.
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::InvalidStateTransition { .. } => "invalid_state_transition",
            OrderError::InvalidQuantity { .. } => "invalid_quantity",
            OrderError::InvalidPrice { .. } => "invalid_price",
            OrderError::NoItems => "no_items",
        }
    }
}
