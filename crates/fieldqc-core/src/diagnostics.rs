//! Per-fetch counters.
//!
//! A [`Diagnostics`] value is created (or [reset](Diagnostics::reset)) at
//! the start of every fetch and handed to each stage by `&mut`. Nothing
//! here is global, so two fetches in flight never share counters.

use serde::{Deserialize, Serialize};

use crate::dedup::DedupStats;
use crate::filter::FilterBreakdown;
use crate::models::BatchStats;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    /// Search and completion requests issued.
    pub api_requests: usize,
    /// Search records collected across all pages.
    pub total_orders_from_api: usize,
    /// Merged orders left after status filtering.
    pub status_filtered_orders: usize,
    /// Filtered orders before deduplication.
    pub original_order_count: usize,
    pub batch_stats: BatchStats,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn record_search_pages(&mut self, pages: usize, orders: usize) {
        self.api_requests += pages;
        self.total_orders_from_api += orders;
    }

    pub fn record_completion(&mut self, stats: &BatchStats) {
        self.api_requests += stats.completed_batches;
        self.batch_stats = stats.clone();
    }

    pub fn record_filter(&mut self, breakdown: &FilterBreakdown) {
        self.status_filtered_orders = breakdown.passed;
    }

    pub fn record_dedup(&mut self, stats: &DedupStats) {
        self.original_order_count = stats.original_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_accumulate_and_reset_clears() {
        let mut diag = Diagnostics::new();
        diag.record_search_pages(3, 1200);

        let mut stats = BatchStats::new(3);
        stats.record_success(500);
        stats.record_success(150);
        diag.record_completion(&stats);

        diag.record_filter(&FilterBreakdown {
            total: 1150,
            passed: 400,
            ..Default::default()
        });
        diag.record_dedup(&DedupStats {
            original_count: 400,
            unique_count: 400,
            ..Default::default()
        });

        assert_eq!(diag.api_requests, 5);
        assert_eq!(diag.total_orders_from_api, 1200);
        assert_eq!(diag.status_filtered_orders, 400);
        assert_eq!(diag.original_order_count, 400);
        assert_eq!(diag.batch_stats.successful_batches, 2);

        diag.reset();
        assert_eq!(diag, Diagnostics::default());
    }

    #[test]
    fn serializes_camel_case() {
        let value = serde_json::to_value(Diagnostics::new()).unwrap();
        assert!(value.get("apiRequests").is_some());
        assert!(value.get("totalOrdersFromApi").is_some());
        assert!(value["batchStats"].get("failedBatches").is_some());
    }
}
