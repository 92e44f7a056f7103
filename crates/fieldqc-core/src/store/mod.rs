//! Persistence abstraction for canonical orders.
//!
//! The import writer only ever talks to an [`OrderStore`]. Backends decide
//! how uniqueness on `order_no` is enforced and report conflicts back as
//! duplicates rather than errors.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{BatchImportOutcome, CanonicalOrder};

/// A backing store for canonical orders.
///
/// | Outcome | Meaning |
/// |---------|---------|
/// | `imported` | a new row was written |
/// | `duplicates` | an order with the same `order_no` already exists |
/// | `errors` | this order could not be written; see `error_details` |
///
/// Returning `Err` means the batch as a whole failed and none of its
/// orders should be assumed persisted.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn persist_batch(&self, orders: &[CanonicalOrder]) -> Result<BatchImportOutcome>;
}
