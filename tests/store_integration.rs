//! SQLite store tests: migrations, batched import through the store,
//! duplicate handling across runs, and the stats query.

use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use fieldqc::config::Config;
use fieldqc::import::import_orders;
use fieldqc::progress::NoProgress;
use fieldqc::sqlite_store::SqliteOrderStore;
use fieldqc::stats::collect_stats;
use fieldqc::{db, migrate};
use fieldqc_core::models::{CanonicalOrder, CompletionRecord, MergedOrder, SearchRecord};
use fieldqc_core::normalize::extract_canonical;
use fieldqc_core::store::OrderStore;

async fn open_store(tmp: &TempDir) -> SqliteOrderStore {
    let mut config = Config::minimal();
    config.db.path = tmp.path().join("data").join("fieldqc.sqlite");
    let pool = db::connect(&config).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    SqliteOrderStore::new(pool)
}

fn completed_order(no: &str, status: &str) -> CanonicalOrder {
    let search = SearchRecord::new(json!({
        "orderNo": no,
        "date": "2024-03-04T14:00:00Z",
        "location": {"name": "Main St Depot"},
        "driver": {"id": "D1", "name": "Sam Lee"},
    }));
    let completion = CompletionRecord::from_payload(
        json!({"orderNo": no, "data": {"status": status, "form": {"note": "ok"}}}),
        true,
    )
    .unwrap();
    let merged = MergedOrder {
        search,
        completion_status: Some(status.to_string()),
        completion: Some(completion),
    };
    extract_canonical(&merged)
}

fn orders(range: std::ops::Range<usize>, status: &str) -> Vec<CanonicalOrder> {
    range
        .map(|i| completed_order(&format!("S{:03}", i), status))
        .collect()
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    migrate::apply(store.pool()).await.unwrap();
    migrate::apply(store.pool()).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn batch_counts_duplicates_against_existing_rows() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let first = store.persist_batch(&orders(0..10, "success")).await.unwrap();
    assert_eq!(first.imported, 10);
    assert_eq!(first.duplicates, 0);
    assert_eq!(first.errors, 0);

    let second = store.persist_batch(&orders(5..15, "success")).await.unwrap();
    assert_eq!(second.imported, 5);
    assert_eq!(second.duplicates, 5);
    assert_eq!(store.count().await.unwrap(), 15);
}

#[tokio::test]
async fn duplicate_within_one_batch_is_counted_once() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let order = completed_order("S001", "success");
    let outcome = store
        .persist_batch(&[order.clone(), order])
        .await
        .unwrap();
    assert_eq!(outcome.imported, 1);
    assert_eq!(outcome.duplicates, 1);
}

#[tokio::test]
async fn order_without_number_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let mut order = completed_order("S001", "success");
    order.order_no = None;
    let outcome = store.persist_batch(&[order]).await.unwrap();
    assert_eq!(outcome.errors, 1);
    assert_eq!(outcome.error_details.len(), 1);
    assert_eq!(outcome.error_details[0].order_no, None);
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn import_then_stats() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let mut all = orders(0..60, "success");
    all.extend(orders(60..70, "failed"));
    all.extend(orders(70..73, "rejected"));

    let cancel = CancellationToken::new();
    let result = import_orders(&store, &all, 25, &cancel, &NoProgress).await;
    assert!(result.success);
    assert_eq!(result.total, 73);
    assert_eq!(result.imported, 73);

    let again = import_orders(&store, &all, 25, &cancel, &NoProgress).await;
    assert!(again.success);
    assert_eq!(again.imported, 0);
    assert_eq!(again.duplicates, 73);

    let stats = collect_stats(store.pool()).await.unwrap();
    assert_eq!(stats.total, 73);
    assert!(stats.last_import_ts.is_some());
    let counted: i64 = stats.by_status.iter().map(|s| s.count).sum();
    assert_eq!(counted, 73);
    // Largest group first.
    assert_eq!(stats.by_status[0].count, 60);
}

#[tokio::test]
async fn empty_database_stats() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let stats = collect_stats(store.pool()).await.unwrap();
    assert_eq!(stats.total, 0);
    assert!(stats.by_status.is_empty());
    assert_eq!(stats.last_import_ts, None);
}
