//! Reconciliation of search records with completion records.
//!
//! The join is a left join on order number: every search record yields
//! exactly one [`MergedOrder`], with `completion` set to `None` when the
//! provider has no completion data for it yet.

use std::collections::HashMap;

use crate::models::{CompletionRecord, MergedOrder, SearchRecord};
use crate::normalize;

/// Completion records indexed by order number.
pub type CompletionMap = HashMap<String, CompletionRecord>;

/// Index completion records by order number. On a key collision the later
/// record replaces the earlier one.
pub fn build_completion_map(records: impl IntoIterator<Item = CompletionRecord>) -> CompletionMap {
    let mut map = CompletionMap::new();
    for record in records {
        map.insert(record.order_no.clone(), record);
    }
    map
}

/// Left-join search records with the completion map.
///
/// The derived `completion_status` comes from the completion payload when
/// one is attached, otherwise from whatever status the search record
/// carries. Output order matches input order.
pub fn merge(search_orders: Vec<SearchRecord>, completions: &CompletionMap) -> Vec<MergedOrder> {
    search_orders
        .into_iter()
        .map(|search| {
            let completion = search
                .order_no()
                .and_then(|order_no| completions.get(&order_no).cloned());
            let completion_status = completion
                .as_ref()
                .and_then(|c| normalize::completion_status(&c.payload))
                .or_else(|| normalize::completion_status(&search.payload));
            MergedOrder {
                search,
                completion,
                completion_status,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn completion(order_no: &str, status: &str) -> CompletionRecord {
        CompletionRecord::from_payload(
            json!({"orderNo": order_no, "data": {"status": status}}),
            true,
        )
        .unwrap()
    }

    #[test]
    fn merge_attaches_matching_completion() {
        let map = build_completion_map(vec![completion("A123", "success")]);
        let merged = merge(vec![SearchRecord::new(json!({"orderNo": "A123"}))], &map);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].completion.as_ref(), map.get("A123"));
        assert_eq!(merged[0].completion_status.as_deref(), Some("success"));
    }

    #[test]
    fn merge_is_a_left_join() {
        let map = build_completion_map(vec![completion("A123", "success")]);
        let merged = merge(
            vec![
                SearchRecord::new(json!({"orderNo": "B456", "status": "Scheduled"})),
                SearchRecord::new(json!({"note": "no order number"})),
            ],
            &map,
        );

        assert_eq!(merged.len(), 2);
        assert!(merged[0].completion.is_none());
        assert_eq!(merged[0].completion_status.as_deref(), Some("scheduled"));
        assert!(merged[1].completion.is_none());
        assert!(merged[1].completion_status.is_none());
    }

    #[test]
    fn completion_map_last_write_wins() {
        let map = build_completion_map(vec![
            completion("A1", "scheduled"),
            completion("A1", "success"),
        ]);
        assert_eq!(map.len(), 1);
        assert_eq!(
            normalize::completion_status(&map["A1"].payload).as_deref(),
            Some("success")
        );
    }

    #[test]
    fn merged_completion_matches_search_order_number() {
        let map = build_completion_map(vec![completion("X1", "failed"), completion("X2", "success")]);
        let merged = merge(
            vec![
                SearchRecord::new(json!({"order_no": "X2"})),
                SearchRecord::new(json!({"data": {"orderNo": "X1"}})),
            ],
            &map,
        );
        for order in &merged {
            let completion = order.completion.as_ref().unwrap();
            assert_eq!(Some(completion.order_no.clone()), order.search.order_no());
        }
    }
}
