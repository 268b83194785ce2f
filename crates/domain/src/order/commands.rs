//! Order commands.

use common::AggregateId;

/// A product and quantity requested in an order.
///
/// The unit price is taken from the product when the line is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: AggregateId,
    pub quantity: u32,
}

impl OrderLine {
    pub fn new(product_id: AggregateId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Command to create a new order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    /// The user placing the order.
    pub user_id: AggregateId,

    /// Initial items; may be empty.
    pub lines: Vec<OrderLine>,
}

impl CreateOrder {
    /// Creates an empty draft order for a user.
    pub fn new(user_id: AggregateId) -> Self {
        Self {
            user_id,
            lines: Vec::new(),
        }
    }

    /// Adds an initial item.
    pub fn with_line(mut self, product_id: AggregateId, quantity: u32) -> Self {
        self.lines.push(OrderLine::new(product_id, quantity));
        self
    }
}

/// Command to add an item to a draft order.
#[derive(Debug, Clone)]
pub struct AddItem {
    pub order_id: AggregateId,
    pub line: OrderLine,
}

impl AddItem {
    pub fn new(order_id: AggregateId, product_id: AggregateId, quantity: u32) -> Self {
        Self {
            order_id,
            line: OrderLine::new(product_id, quantity),
        }
    }
}

/// Command to confirm an order, taking stock for every item.
#[derive(Debug, Clone)]
pub struct ConfirmOrder {
    pub order_id: AggregateId,
}

impl ConfirmOrder {
    pub fn new(order_id: AggregateId) -> Self {
        Self { order_id }
    }
}

/// Command to cancel an order.
#[derive(Debug, Clone)]
pub struct CancelOrder {
    pub order_id: AggregateId,
}

impl CancelOrder {
    pub fn new(order_id: AggregateId) -> Self {
        Self { order_id }
    }
}
