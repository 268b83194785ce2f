//! Typed wire payloads, one per topic.
//!
//! Each payload serializes to exactly the record stored in the outbox for the
//! same event, so consumers see one shape whichever path delivered it.

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::chat::{MessageCreatedData, MessageReadData};
use domain::order::{OrderCancelledData, OrderConfirmedData, OrderCreatedData, OrderItemAddedData};
use domain::product::{ProductCreatedData, ProductStockUpdatedData};
use domain::user::{UserCreatedData, UserPasswordChangedData, UserProfileUpdatedData};
use serde::{Deserialize, Serialize};

/// `user.created`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCreatedPayload {
    pub user_id: AggregateId,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// `user.profile.updated`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfileUpdatedPayload {
    pub user_id: AggregateId,
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

/// `user.password.changed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPasswordChangedPayload {
    pub user_id: AggregateId,
    pub changed_at: DateTime<Utc>,
}

/// `chat.message.created`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageCreatedPayload {
    pub message_id: AggregateId,
    pub sender_id: AggregateId,
    pub receiver_id: AggregateId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// `chat.message.read`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageReadPayload {
    pub message_id: AggregateId,
    pub reader_id: AggregateId,
    pub read_at: DateTime<Utc>,
}

/// `product.created`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCreatedPayload {
    pub product_id: AggregateId,
    pub name: String,
    pub description: String,
    /// Unit price in cents.
    pub price: i64,
    pub stock: u32,
    pub created_at: DateTime<Utc>,
}

/// `product.stock.updated`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductStockUpdatedPayload {
    pub product_id: AggregateId,
    pub old_stock: u32,
    pub new_stock: u32,
    pub updated_at: DateTime<Utc>,
}

/// `order.created`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedPayload {
    pub order_id: AggregateId,
    pub user_id: AggregateId,
    /// Cents.
    pub total_amount: i64,
    pub item_count: usize,
    pub created_at: DateTime<Utc>,
}

/// `order.item.added`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemAddedPayload {
    pub order_id: AggregateId,
    pub product_id: AggregateId,
    pub quantity: u32,
    pub unit_price: i64,
    pub sub_total: i64,
    pub updated_at: DateTime<Utc>,
}

/// `order.confirmed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderConfirmedPayload {
    pub order_id: AggregateId,
    pub user_id: AggregateId,
    pub total_amount: i64,
    pub item_count: usize,
    pub confirmed_at: DateTime<Utc>,
}

/// `order.cancelled`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelledPayload {
    pub order_id: AggregateId,
    pub user_id: AggregateId,
    pub cancelled_at: DateTime<Utc>,
}

impl From<&UserCreatedData> for UserCreatedPayload {
    fn from(data: &UserCreatedData) -> Self {
        Self {
            user_id: data.user_id,
            email: data.email.clone(),
            name: data.name.clone(),
            created_at: data.created_at,
        }
    }
}

impl From<&UserProfileUpdatedData> for UserProfileUpdatedPayload {
    fn from(data: &UserProfileUpdatedData) -> Self {
        Self {
            user_id: data.user_id,
            name: data.name.clone(),
            updated_at: data.updated_at,
        }
    }
}

impl From<&UserPasswordChangedData> for UserPasswordChangedPayload {
    fn from(data: &UserPasswordChangedData) -> Self {
        Self {
            user_id: data.user_id,
            changed_at: data.changed_at,
        }
    }
}

impl From<&MessageCreatedData> for MessageCreatedPayload {
    fn from(data: &MessageCreatedData) -> Self {
        Self {
            message_id: data.message_id,
            sender_id: data.sender_id,
            receiver_id: data.receiver_id,
            content: data.content.clone(),
            created_at: data.created_at,
        }
    }
}

impl From<&MessageReadData> for MessageReadPayload {
    fn from(data: &MessageReadData) -> Self {
        Self {
            message_id: data.message_id,
            reader_id: data.reader_id,
            read_at: data.read_at,
        }
    }
}

impl From<&ProductCreatedData> for ProductCreatedPayload {
    fn from(data: &ProductCreatedData) -> Self {
        Self {
            product_id: data.product_id,
            name: data.name.clone(),
            description: data.description.clone(),
            price: data.price.cents(),
            stock: data.stock,
            created_at: data.created_at,
        }
    }
}

impl From<&ProductStockUpdatedData> for ProductStockUpdatedPayload {
    fn from(data: &ProductStockUpdatedData) -> Self {
        Self {
            product_id: data.product_id,
            old_stock: data.old_stock,
            new_stock: data.new_stock,
            updated_at: data.updated_at,
        }
    }
}

impl From<&OrderCreatedData> for OrderCreatedPayload {
    fn from(data: &OrderCreatedData) -> Self {
        Self {
            order_id: data.order_id,
            user_id: data.user_id,
            total_amount: data.total_amount.cents(),
            item_count: data.item_count,
            created_at: data.created_at,
        }
    }
}

impl From<&OrderItemAddedData> for OrderItemAddedPayload {
    fn from(data: &OrderItemAddedData) -> Self {
        Self {
            order_id: data.order_id,
            product_id: data.product_id,
            quantity: data.quantity,
            unit_price: data.unit_price.cents(),
            sub_total: data.sub_total.cents(),
            updated_at: data.updated_at,
        }
    }
}

impl From<&OrderConfirmedData> for OrderConfirmedPayload {
    fn from(data: &OrderConfirmedData) -> Self {
        Self {
            order_id: data.order_id,
            user_id: data.user_id,
            total_amount: data.total_amount.cents(),
            item_count: data.item_count,
            confirmed_at: data.confirmed_at,
        }
    }
}

impl From<&OrderCancelledData> for OrderCancelledPayload {
    fn from(data: &OrderCancelledData) -> Self {
        Self {
            order_id: data.order_id,
            user_id: data.user_id,
            cancelled_at: data.cancelled_at,
        }
    }
}
