//! SQLite-backed [`OrderStore`].
//!
//! Each batch runs in one transaction. Uniqueness on `order_no` is
//! enforced by the `qc_orders` table itself: an insert that hits the
//! constraint affects zero rows and is counted as a duplicate. Any other
//! per-row failure is recorded in `error_details` without rolling back the
//! rest of the batch.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use fieldqc_core::models::{BatchImportOutcome, CanonicalOrder, ImportErrorDetail};
use fieldqc_core::store::OrderStore;

pub struct SqliteOrderStore {
    pool: SqlitePool,
}

impl SqliteOrderStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM qc_orders")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl OrderStore for SqliteOrderStore {
    async fn persist_batch(&self, orders: &[CanonicalOrder]) -> Result<BatchImportOutcome> {
        let mut outcome = BatchImportOutcome::default();
        let imported_at = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for order in orders {
            let Some(order_no) = order.order_no.as_deref() else {
                outcome.errors += 1;
                outcome.error_details.push(ImportErrorDetail {
                    order_no: None,
                    message: format!("order {} has no order number", order.id),
                });
                continue;
            };

            let completion_response = order
                .raw_completion
                .as_ref()
                .map(serde_json::Value::to_string);

            let result = sqlx::query(
                r#"
                INSERT INTO qc_orders (id, order_no, status, completion_status, timestamp,
                                       location_name, driver_name, notes, has_images,
                                       search_response, completion_response, imported_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(order_no) DO NOTHING
                "#,
            )
            .bind(&order.id)
            .bind(order_no)
            .bind(order.status.as_str())
            .bind(&order.completion_status)
            .bind(order.service_date.timestamp())
            .bind(&order.location.name)
            .bind(&order.driver.name)
            .bind(&order.notes)
            .bind(order.has_images)
            .bind(order.raw_search.to_string())
            .bind(completion_response)
            .bind(imported_at)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(done) if done.rows_affected() == 0 => outcome.duplicates += 1,
                Ok(_) => outcome.imported += 1,
                Err(err) => {
                    tracing::debug!(order_no, error = %err, "order insert failed");
                    outcome.errors += 1;
                    outcome.error_details.push(ImportErrorDetail {
                        order_no: Some(order_no.to_string()),
                        message: err.to_string(),
                    });
                }
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }
}

