//! In-memory [`OrderStore`] for tests and dry runs.
//!
//! Orders are kept in a `HashMap` keyed by order number behind
//! `std::sync::RwLock`.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{BatchImportOutcome, CanonicalOrder, ImportErrorDetail};

use super::OrderStore;

pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<String, CanonicalOrder>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.orders.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, order_no: &str) -> Option<CanonicalOrder> {
        self.orders
            .read()
            .ok()
            .and_then(|o| o.get(order_no).cloned())
    }
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn persist_batch(&self, orders: &[CanonicalOrder]) -> Result<BatchImportOutcome> {
        let mut stored = self
            .orders
            .write()
            .map_err(|_| anyhow!("in-memory order store lock poisoned"))?;
        let mut outcome = BatchImportOutcome::default();

        for order in orders {
            let Some(order_no) = order.order_no.as_ref() else {
                outcome.errors += 1;
                outcome.error_details.push(ImportErrorDetail {
                    order_no: None,
                    message: format!("order {} has no order number", order.id),
                });
                continue;
            };
            if stored.contains_key(order_no) {
                outcome.duplicates += 1;
            } else {
                stored.insert(order_no.clone(), order.clone());
                outcome.imported += 1;
            }
        }
        Ok(outcome)
    }
}
