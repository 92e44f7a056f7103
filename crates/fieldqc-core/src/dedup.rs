//! Order-number deduplication.
//!
//! Works on any record type that can name its order number. The first
//! occurrence of a key fixes its position in the output; a later
//! occurrence replaces the stored value in place. Records without an
//! order number are dropped with a warning.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{CanonicalOrder, CompletionRecord, MergedOrder, SearchRecord};

/// A record that can be keyed by order number.
pub trait OrderKeyed {
    fn order_key(&self) -> Option<String>;
}

impl OrderKeyed for SearchRecord {
    fn order_key(&self) -> Option<String> {
        self.order_no()
    }
}

impl OrderKeyed for CompletionRecord {
    fn order_key(&self) -> Option<String> {
        Some(self.order_no.clone())
    }
}

impl OrderKeyed for MergedOrder {
    fn order_key(&self) -> Option<String> {
        self.search.order_no()
    }
}

impl OrderKeyed for CanonicalOrder {
    fn order_key(&self) -> Option<String> {
        self.order_no.clone()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupStats {
    pub original_count: usize,
    pub unique_count: usize,
    /// `original_count - unique_count`, including records dropped for
    /// having no order number.
    pub removed_count: usize,
    /// Keys seen more than once, in first-seen order.
    pub duplicated_order_numbers: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DedupResult<T> {
    pub unique_orders: Vec<T>,
    pub stats: DedupStats,
}

pub fn deduplicate<T: OrderKeyed>(orders: Vec<T>) -> DedupResult<T> {
    let original_count = orders.len();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<T> = Vec::new();
    let mut duplicated: Vec<String> = Vec::new();
    let mut seen_duplicate: HashSet<String> = HashSet::new();
    let mut missing = 0usize;

    for order in orders {
        let Some(key) = order.order_key() else {
            missing += 1;
            continue;
        };
        match index.get(&key) {
            Some(&pos) => {
                if seen_duplicate.insert(key.clone()) {
                    duplicated.push(key);
                }
                unique[pos] = order;
            }
            None => {
                index.insert(key, unique.len());
                unique.push(order);
            }
        }
    }

    if missing > 0 {
        tracing::warn!(count = missing, "dropped records without an order number");
    }

    let unique_count = unique.len();
    DedupResult {
        unique_orders: unique,
        stats: DedupStats {
            original_count,
            unique_count,
            removed_count: original_count - unique_count,
            duplicated_order_numbers: duplicated,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(order_no: &str, tag: u32) -> SearchRecord {
        SearchRecord::new(json!({"orderNo": order_no, "tag": tag}))
    }

    #[test]
    fn keeps_first_position_and_last_value() {
        let result = deduplicate(vec![rec("A", 1), rec("B", 1), rec("A", 2), rec("C", 1)]);

        let keys: Vec<_> = result
            .unique_orders
            .iter()
            .map(|o| o.order_no().unwrap())
            .collect();
        assert_eq!(keys, vec!["A", "B", "C"]);
        assert_eq!(result.unique_orders[0].payload["tag"], 2);
        assert_eq!(
            result.stats,
            DedupStats {
                original_count: 4,
                unique_count: 3,
                removed_count: 1,
                duplicated_order_numbers: vec!["A".to_string()],
            }
        );
    }

    #[test]
    fn drops_records_without_order_number() {
        let result = deduplicate(vec![
            rec("A", 1),
            SearchRecord::new(json!({"customer": "nobody"})),
        ]);
        assert_eq!(result.unique_orders.len(), 1);
        assert_eq!(result.stats.removed_count, 1);
        assert!(result.stats.duplicated_order_numbers.is_empty());
    }

    #[test]
    fn deduplicate_is_idempotent() {
        let once = deduplicate(vec![rec("A", 1), rec("A", 2), rec("B", 3), rec("B", 4)]);
        let twice = deduplicate(once.unique_orders.clone());

        assert_eq!(twice.unique_orders, once.unique_orders);
        assert_eq!(twice.stats.removed_count, 0);
        assert_eq!(twice.stats.unique_count, twice.stats.original_count);
    }

    #[test]
    fn empty_input() {
        let result = deduplicate(Vec::<SearchRecord>::new());
        assert!(result.unique_orders.is_empty());
        assert_eq!(result.stats, DedupStats::default());
    }

    #[test]
    fn unique_count_plus_removed_is_original() {
        let input: Vec<_> = (0..100).map(|i| rec(&format!("K{}", i % 37), i)).collect();
        let result = deduplicate(input);
        assert_eq!(result.stats.unique_count, 37);
        assert_eq!(
            result.stats.unique_count + result.stats.removed_count,
            result.stats.original_count
        );
    }

    #[test]
    fn many_duplicated_keys_listed_once_in_first_seen_order() {
        let keys = 20_000;
        let input: Vec<_> = (0..keys * 2)
            .map(|i| rec(&format!("K{}", i % keys), i as u32))
            .collect();
        let result = deduplicate(input);

        assert_eq!(result.stats.unique_count, keys);
        assert_eq!(result.stats.removed_count, keys);
        let listed = &result.stats.duplicated_order_numbers;
        assert_eq!(listed.len(), keys);
        assert_eq!(listed[0], "K0");
        assert_eq!(listed[keys - 1], format!("K{}", keys - 1));
    }
}
