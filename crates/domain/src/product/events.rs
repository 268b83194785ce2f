//! Product domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::order::Money;

/// Events that can occur on a product aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProductEvent {
    /// Product was added to the catalog.
    ProductCreated(ProductCreatedData),

    /// Stock level changed.
    ProductStockUpdated(ProductStockUpdatedData),
}

impl DomainEvent for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "ProductCreated",
            ProductEvent::ProductStockUpdated(_) => "ProductStockUpdated",
        }
    }

    fn aggregate_type(&self) -> &'static str {
        "Product"
    }

    fn aggregate_id(&self) -> AggregateId {
        match self {
            ProductEvent::ProductCreated(data) => data.product_id,
            ProductEvent::ProductStockUpdated(data) => data.product_id,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(data) => data.created_at,
            ProductEvent::ProductStockUpdated(data) => data.updated_at,
        }
    }
}

/// Data for ProductCreated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCreatedData {
    pub product_id: AggregateId,
    pub name: String,
    pub description: String,

    /// Unit price.
    pub price: Money,

    /// Initial stock.
    pub stock: u32,
    pub created_at: DateTime<Utc>,
}

/// Data for ProductStockUpdated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductStockUpdatedData {
    pub product_id: AggregateId,
    pub old_stock: u32,
    pub new_stock: u32,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_update_payload_shape() {
        let id = AggregateId::new();
        let event = ProductEvent::ProductStockUpdated(ProductStockUpdatedData {
            product_id: id,
            old_stock: 5,
            new_stock: 3,
            updated_at: Utc::now(),
        });

        assert_eq!(event.event_type(), "ProductStockUpdated");
        assert_eq!(event.aggregate_type(), "Product");

        let payload = event.payload().unwrap();
        assert_eq!(payload["product_id"], id.to_string());
        assert_eq!(payload["old_stock"], 5);
        assert_eq!(payload["new_stock"], 3);
    }
}
