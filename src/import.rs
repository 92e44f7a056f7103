//! Import writer.
//!
//! Persists canonical orders through an [`OrderStore`] in fixed-size
//! batches, one batch at a time. A batch that fails as a whole counts all
//! of its orders as errors and the import moves on to the next batch.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fieldqc_core::models::{CanonicalOrder, ImportProgress, ImportResult};
use fieldqc_core::store::OrderStore;

use crate::progress::{PipelineProgressReporter, ProgressEvent};

pub async fn import_orders(
    store: &dyn OrderStore,
    orders: &[CanonicalOrder],
    batch_size: usize,
    cancel: &CancellationToken,
    progress: &dyn PipelineProgressReporter,
) -> ImportResult {
    let batch_size = batch_size.max(1);
    let total_batches = orders.len().div_ceil(batch_size);
    let mut result = ImportResult::new(orders.len());

    info!(orders = orders.len(), batches = total_batches, "importing orders");

    for (index, batch) in orders.chunks(batch_size).enumerate() {
        if cancel.is_cancelled() {
            warn!(
                processed = result.processed(),
                total = result.total,
                "import cancelled"
            );
            break;
        }

        match store.persist_batch(batch).await {
            Ok(outcome) => {
                if outcome.errors > 0 {
                    warn!(batch = index, errors = outcome.errors, "import batch had errors");
                }
                result.absorb(outcome);
            }
            Err(err) => {
                warn!(batch = index, orders = batch.len(), error = %err, "import batch failed");
                result.absorb_failed_batch(batch, &format!("{:#}", err));
            }
        }

        let step = ImportProgress::new(result.processed(), result.total);
        progress.report(ProgressEvent::ImportBatch {
            current: step.current,
            total: step.total,
            percentage: step.percentage,
        });
    }

    // An interrupted import is never a success, even with zero errors.
    if result.processed() < result.total {
        result.success = false;
    }

    info!(
        imported = result.imported,
        duplicates = result.duplicates,
        errors = result.errors,
        "import finished"
    );
    result
}

/// Read canonical orders from a JSON file: either a bare array or a fetch
/// report with an `orders` field.
pub fn read_orders_file(path: &std::path::Path) -> Result<Vec<CanonicalOrder>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let orders = match value {
        serde_json::Value::Object(mut map) if map.contains_key("orders") => map
            .remove("orders")
            .unwrap_or(serde_json::Value::Array(vec![])),
        other => other,
    };
    serde_json::from_value(orders)
        .with_context(|| format!("{} does not contain canonical orders", path.display()))
}

pub fn print_summary(result: &ImportResult) {
    println!("import");
    println!("  total: {}", result.total);
    println!("  imported: {}", result.imported);
    println!("  duplicates: {}", result.duplicates);
    println!("  errors: {}", result.errors);
    for detail in result.error_details.iter().take(10) {
        println!(
            "    {}: {}",
            detail.order_no.as_deref().unwrap_or("<no order number>"),
            detail.message
        );
    }
    if result.error_details.len() > 10 {
        println!("    ... {} more", result.error_details.len() - 10);
    }
    println!("{}", if result.success { "ok" } else { "completed with errors" });
}
