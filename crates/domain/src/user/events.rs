//! User domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

/// Events that can occur on a user aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum UserEvent {
    /// User registered.
    UserCreated(UserCreatedData),

    /// Display name changed.
    UserProfileUpdated(UserProfileUpdatedData),

    /// Password changed. The hash never leaves the aggregate.
    UserPasswordChanged(UserPasswordChangedData),
}

impl DomainEvent for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::UserCreated(_) => "UserCreated",
            UserEvent::UserProfileUpdated(_) => "UserProfileUpdated",
            UserEvent::UserPasswordChanged(_) => "UserPasswordChanged",
        }
    }

    fn aggregate_type(&self) -> &'static str {
        "User"
    }

    fn aggregate_id(&self) -> AggregateId {
        match self {
            UserEvent::UserCreated(data) => data.user_id,
            UserEvent::UserProfileUpdated(data) => data.user_id,
            UserEvent::UserPasswordChanged(data) => data.user_id,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::UserCreated(data) => data.created_at,
            UserEvent::UserProfileUpdated(data) => data.updated_at,
            UserEvent::UserPasswordChanged(data) => data.changed_at,
        }
    }
}

/// Data for UserCreated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCreatedData {
    pub user_id: AggregateId,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Data for UserProfileUpdated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfileUpdatedData {
    pub user_id: AggregateId,
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

/// Data for UserPasswordChanged event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPasswordChangedData {
    pub user_id: AggregateId,
    pub changed_at: DateTime<Utc>,
}
