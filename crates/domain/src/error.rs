//! Domain error types.

use common::AggregateId;
use event_store::EventStoreError;
use thiserror::Error;

use crate::chat::ChatError;
use crate::dispatch::DispatchError;
use crate::order::OrderError;
use crate::product::ProductError;
use crate::uow::{BoxError, UnitOfWorkError};
use crate::user::UserError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("User error: {0}")]
    User(#[from] UserError),

    #[error("Message error: {0}")]
    Message(#[from] ChatError),

    #[error("Product error: {0}")]
    Product(#[from] ProductError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Aggregate not found.
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    NotFound {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    #[error(transparent)]
    UnitOfWork(#[from] UnitOfWorkError),

    /// A required post-commit handler failed. The transaction is committed.
    #[error("Dispatch failed after commit: {0}")]
    Dispatch(#[from] DispatchError),

    /// The command's deadline passed before commit.
    #[error("Deadline exceeded before commit")]
    DeadlineExceeded,

    /// The external password hasher failed.
    #[error("Password hashing failed: {0}")]
    PasswordHashing(#[source] BoxError),

    /// An error occurred reading the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),
}

impl DomainError {
    pub(crate) fn not_found<A: crate::aggregate::Aggregate>(aggregate_id: AggregateId) -> Self {
        DomainError::NotFound {
            aggregate_type: A::aggregate_type(),
            aggregate_id,
        }
    }

    /// Returns true when a business rule rejected the command.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            DomainError::User(_)
                | DomainError::Message(_)
                | DomainError::Product(_)
                | DomainError::Order(_)
        )
    }

    /// Stable code for client display.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::User(e) => e.code(),
            DomainError::Message(e) => e.code(),
            DomainError::Product(e) => e.code(),
            DomainError::Order(e) => e.code(),
            DomainError::NotFound { .. } => "not_found",
            DomainError::UnitOfWork(UnitOfWorkError::ConcurrencyConflict { .. }) => {
                "concurrency_conflict"
            }
            DomainError::UnitOfWork(_) => "persistence_error",
            DomainError::Dispatch(_) => "dispatch_failed",
            DomainError::DeadlineExceeded => "deadline_exceeded",
            DomainError::PasswordHashing(_) => "password_hashing_failed",
            DomainError::EventStore(_) => "event_store_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_violations_are_classified() {
        let err: DomainError = OrderError::NoItems.into();
        assert!(err.is_invariant_violation());
        assert_eq!(err.code(), "no_items");

        let err = DomainError::DeadlineExceeded;
        assert!(!err.is_invariant_violation());
        assert_eq!(err.code(), "deadline_exceeded");
    }

    #[test]
    fn concurrency_conflict_has_its_own_code() {
        let err: DomainError = UnitOfWorkError::ConcurrencyConflict {
            aggregate_type: "Order",
            aggregate_id: AggregateId::new(),
            expected: 1,
        }
        .into();
        assert_eq!(err.code(), "concurrency_conflict");
    }
}
