//! HTTP API tests: the router is served on an ephemeral port and driven
//! with reqwest.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use fieldqc::config::Config;
use fieldqc::error::FetchError;
use fieldqc::server::{router, AppState};
use fieldqc::traits::{OrderProvider, SearchPage};
use fieldqc::{db, migrate};
use fieldqc_core::models::{CompletionRecord, DateRange, SearchRecord};

/// Two search records on one page, both completed successfully.
struct TwoOrders;

#[async_trait]
impl OrderProvider for TwoOrders {
    async fn search_page(
        &self,
        _range: &DateRange,
        _after_tag: Option<&str>,
    ) -> Result<SearchPage, FetchError> {
        Ok(SearchPage {
            orders: vec![
                SearchRecord::new(json!({"orderNo": "A1", "location": {"name": "North"}})),
                SearchRecord::new(json!({"orderNo": "A2", "location": {"name": "South"}})),
            ],
            after_tag: None,
        })
    }

    async fn completion_batch(
        &self,
        order_numbers: &[String],
    ) -> Result<Vec<CompletionRecord>, FetchError> {
        Ok(order_numbers
            .iter()
            .filter_map(|no| {
                CompletionRecord::from_payload(
                    json!({
                        "orderNo": no,
                        "data": {
                            "status": "success",
                            "startTime": {"localTime": "2024-03-04T09:00:00"},
                            "endTime": {"localTime": "2024-03-04T09:30:00"}
                        }
                    }),
                    true,
                )
            })
            .collect())
    }
}

struct TestServer {
    base: String,
    shutdown: CancellationToken,
    _tmp: TempDir,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn start(provider: Option<Arc<dyn OrderProvider>>) -> TestServer {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::minimal();
    config.db.path = tmp.path().join("fieldqc.sqlite");
    config.pipeline.import_batch_size = 2;

    let pool = db::connect(&config).await.unwrap();
    migrate::apply(&pool).await.unwrap();

    let shutdown = CancellationToken::new();
    let app = router(AppState::new(config, pool, provider, shutdown.clone()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let token = shutdown.clone();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
            .unwrap();
    });

    TestServer {
        base: format!("http://{}", addr),
        shutdown,
        _tmp: tmp,
    }
}

fn order_json(no: &str) -> Value {
    json!({
        "id": format!("order-{}", no),
        "order_no": no,
        "status": "completed",
        "service_date": "2024-03-04T14:00:00Z",
        "service_notes": null,
        "tech_notes": null,
        "notes": null,
        "location": {"name": "North", "address": null, "city": null, "state": null, "zip": null},
        "driver": {"id": null, "name": "N/A"},
        "has_images": false,
        "signature_url": null,
        "tracking_url": null,
        "completion_status": "success",
        "raw_search": {"orderNo": no},
        "raw_completion": null
    })
}

#[tokio::test]
async fn health_reports_ok() {
    let server = start(None).await;
    let body: Value = reqwest::get(format!("{}/health", server.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn fetch_runs_the_pipeline() {
    let server = start(Some(Arc::new(TwoOrders))).await;
    let response = reqwest::Client::new()
        .post(format!("{}/orders/fetch", server.base))
        .json(&json!({"from": "2024-03-01", "to": "2024-03-07"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let report: Value = response.json().await.unwrap();
    assert_eq!(report["orders"].as_array().unwrap().len(), 2);
    assert_eq!(report["filterBreakdown"]["passed"], 2);
    assert_eq!(report["searchTruncated"], false);
    assert_eq!(report["completionSuccess"], true);
}

#[tokio::test]
async fn fetch_rejects_inverted_range() {
    let server = start(Some(Arc::new(TwoOrders))).await;
    let response = reqwest::Client::new()
        .post(format!("{}/orders/fetch", server.base))
        .json(&json!({"from": "2024-03-07", "to": "2024-03-01"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn fetch_rejects_out_of_range_offset() {
    let server = start(Some(Arc::new(TwoOrders))).await;
    let client = reqwest::Client::new();

    for minutes in [40_000_000, i32::MIN, 24 * 60] {
        let response = client
            .post(format!("{}/orders/fetch", server.base))
            .json(&json!({"from": "2024-03-01", "to": "2024-03-07", "utc_offset_minutes": minutes}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "offset {} minutes", minutes);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"]["code"], "bad_request");
    }
}

#[tokio::test]
async fn fetch_rejects_scheduled_in_status_list() {
    let server = start(Some(Arc::new(TwoOrders))).await;
    let response = reqwest::Client::new()
        .post(format!("{}/orders/fetch", server.base))
        .json(&json!({
            "from": "2024-03-01",
            "to": "2024-03-07",
            "valid_statuses": ["success", "scheduled"]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn fetch_without_provider_is_unavailable() {
    let server = start(None).await;
    let response = reqwest::Client::new()
        .post(format!("{}/orders/fetch", server.base))
        .json(&json!({"from": "2024-03-01", "to": "2024-03-07"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "provider_unavailable");
}

#[tokio::test]
async fn import_batches_and_counts_duplicates() {
    let server = start(None).await;
    let client = reqwest::Client::new();
    let orders: Vec<Value> = ["B1", "B2", "B3"].iter().map(|n| order_json(n)).collect();

    let first: Value = client
        .post(format!("{}/orders/import", server.base))
        .json(&json!({"orders": orders}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["success"], true);
    assert_eq!(first["total"], 3);
    assert_eq!(first["imported"], 3);

    let second: Value = client
        .post(format!("{}/orders/import", server.base))
        .json(&json!({"orders": orders}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["imported"], 0);
    assert_eq!(second["duplicates"], 3);
}

#[tokio::test]
async fn import_batch_enforces_batch_limit() {
    let server = start(None).await;
    let client = reqwest::Client::new();

    let ok: Value = client
        .post(format!("{}/orders/import-batch", server.base))
        .json(&json!({"orders": [order_json("C1"), order_json("C2")]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ok["imported"], 2);
    assert_eq!(ok["errorDetails"], json!([]));

    let too_big = client
        .post(format!("{}/orders/import-batch", server.base))
        .json(&json!({"orders": [order_json("C3"), order_json("C4"), order_json("C5")]}))
        .send()
        .await
        .unwrap();
    assert_eq!(too_big.status(), 400);
}
