//! Shared identity types used across the delivery pipeline crates.

pub mod types;

pub use types::AggregateId;
