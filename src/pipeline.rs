//! Fetch pipeline orchestration.
//!
//! Coordinates the full fetch flow for one date range:
//!
//! ```text
//! search pager ─▶ unique order numbers ─▶ completion fetcher ─▶ completion map
//!                                                                    │
//!     canonical orders ◀─ normalize ◀─ dedup ◀─ status filter ◀─ merge
//! ```
//!
//! A failed search page aborts the run. Failed completion batches do not:
//! their orders simply have no completion attached and are dropped by the
//! status filter, and the failures are listed in the report.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use fieldqc_core::dedup::{deduplicate, DedupStats};
use fieldqc_core::diagnostics::Diagnostics;
use fieldqc_core::filter::{FilterBreakdown, StatusFilter};
use fieldqc_core::merge::{build_completion_map, merge};
use fieldqc_core::models::{BatchError, CanonicalOrder, DateRange, SearchRecord};
use fieldqc_core::normalize::extract_canonical;

use crate::completion::{fetch_completion_details, CompletionOptions};
use crate::config::{self, Config};
use crate::db;
use crate::error::FetchError;
use crate::import::{import_orders, print_summary};
use crate::migrate;
use crate::pager::collect_all_search_results;
use crate::progress::{PipelineProgressReporter, ProgressMode};
use crate::provider::ProviderClient;
use crate::sqlite_store::SqliteOrderStore;
use crate::traits::OrderProvider;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub max_search_pages: usize,
    pub completion: CompletionOptions,
    pub valid_statuses: Vec<String>,
}

impl FetchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_search_pages: config.pipeline.max_search_pages,
            completion: CompletionOptions::from_config(&config.pipeline, &config.provider),
            valid_statuses: config.pipeline.valid_statuses.clone(),
        }
    }
}

/// Result of one fetch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchReport {
    pub range: DateRange,
    pub orders: Vec<CanonicalOrder>,
    pub diagnostics: Diagnostics,
    pub filter_breakdown: FilterBreakdown,
    pub dedup_stats: DedupStats,
    /// Pagination stopped at the page ceiling; more orders may exist.
    pub search_truncated: bool,
    /// False only when completion batches failed and none returned records.
    pub completion_success: bool,
    pub completion_errors: Vec<BatchError>,
}

/// Order numbers in first-seen order, each once.
fn unique_order_numbers(orders: &[SearchRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    orders
        .iter()
        .filter_map(SearchRecord::order_no)
        .filter(|n| seen.insert(n.clone()))
        .collect()
}

pub async fn fetch_orders(
    provider: Arc<dyn OrderProvider>,
    range: &DateRange,
    options: &FetchOptions,
    cancel: &CancellationToken,
    progress: &dyn PipelineProgressReporter,
) -> Result<FetchReport, FetchError> {
    let mut diagnostics = Diagnostics::new();
    info!(range = %range, "fetch started");

    let search = collect_all_search_results(
        provider.as_ref(),
        range,
        options.max_search_pages,
        cancel,
        progress,
    )
    .await
    .into_result()?;
    diagnostics.record_search_pages(search.pages, search.orders.len());

    let order_numbers = unique_order_numbers(&search.orders);
    let completion = fetch_completion_details(
        Arc::clone(&provider),
        &order_numbers,
        options.completion,
        cancel,
        progress,
    )
    .await;
    if cancel.is_cancelled() {
        return Err(FetchError::Cancelled);
    }
    diagnostics.record_completion(&completion.batch_stats);

    let completion_map = build_completion_map(completion.orders);
    let merged = merge(search.orders, &completion_map);

    let filtered = StatusFilter::new(&options.valid_statuses).apply(&merged);
    diagnostics.record_filter(&filtered.breakdown);

    let deduped = deduplicate(filtered.orders);
    diagnostics.record_dedup(&deduped.stats);

    let orders: Vec<CanonicalOrder> = deduped
        .unique_orders
        .iter()
        .map(|order| extract_canonical(order))
        .collect();

    info!(
        range = %range,
        fetched = diagnostics.total_orders_from_api,
        passed_filter = filtered.breakdown.passed,
        unique = orders.len(),
        failed_batches = completion.batch_stats.failed_batches,
        "fetch finished"
    );

    Ok(FetchReport {
        range: *range,
        orders,
        diagnostics,
        filter_breakdown: filtered.breakdown,
        dedup_stats: deduped.stats,
        search_truncated: search.truncated,
        completion_success: completion.success,
        completion_errors: completion.errors,
    })
}

/// Interpret CLI dates. Without `utc`, they are local calendar dates and are
/// widened to the UTC dates they overlap.
pub fn resolve_range(from: NaiveDate, to: NaiveDate, utc: bool) -> Result<DateRange> {
    if utc {
        DateRange::new(from, to)
    } else {
        let offset = *chrono::Local::now().offset();
        DateRange::from_local_dates(from, to, offset)
    }
}

pub struct FetchCommand<'a> {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub utc: bool,
    pub statuses: Vec<String>,
    pub output: Option<&'a Path>,
    pub import: bool,
    pub progress: ProgressMode,
}

/// `fqc fetch`: run the pipeline, print a summary, optionally write the
/// report and import the orders.
pub async fn run_fetch(
    config: &Config,
    command: FetchCommand<'_>,
    cancel: &CancellationToken,
) -> Result<()> {
    let range = resolve_range(command.from, command.to, command.utc)?;
    let mut options = FetchOptions::from_config(config);
    if !command.statuses.is_empty() {
        config::validate_statuses(&command.statuses)?;
        options.valid_statuses = command.statuses;
    }

    let provider: Arc<dyn OrderProvider> = Arc::new(ProviderClient::from_config(&config.provider)?);
    let reporter = command.progress.reporter();

    let report = fetch_orders(provider, &range, &options, cancel, reporter.as_ref())
        .await
        .with_context(|| format!("fetch {} failed", range))?;

    print_fetch_summary(&report);

    if let Some(path) = command.output {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("  report written: {}", path.display());
    }

    if command.import {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        let store = SqliteOrderStore::new(pool.clone());
        let result = import_orders(
            &store,
            &report.orders,
            config.pipeline.import_batch_size,
            cancel,
            reporter.as_ref(),
        )
        .await;
        print_summary(&result);
        pool.close().await;
    }

    Ok(())
}

pub fn print_fetch_summary(report: &FetchReport) {
    let breakdown = &report.filter_breakdown;
    let batches = &report.diagnostics.batch_stats;

    println!("fetch {}", report.range);
    println!("  api requests: {}", report.diagnostics.api_requests);
    println!("  orders from search: {}", report.diagnostics.total_orders_from_api);
    if report.search_truncated {
        println!("  warning: page ceiling reached, results may be incomplete");
    }
    if !report.completion_success {
        println!("  warning: every completion batch failed");
    }
    println!(
        "  completion batches: {} ok, {} failed of {}",
        batches.successful_batches, batches.failed_batches, batches.total_batches
    );
    for err in &report.completion_errors {
        println!(
            "    batch {} ({} orders): {}",
            err.batch_index, err.order_count, err.message
        );
    }
    println!(
        "  status filter: {} passed, {} rejected",
        breakdown.passed,
        breakdown.rejected()
    );
    println!(
        "    no completion: {}, unsuccessful: {}, no data: {}, scheduled: {}, status: {}, missing times: {}",
        breakdown.no_completion,
        breakdown.completion_unsuccessful,
        breakdown.missing_data,
        breakdown.scheduled,
        breakdown.status_not_allowed,
        breakdown.missing_timestamps
    );
    println!(
        "  duplicates removed: {}",
        report.dedup_stats.removed_count
    );
    println!("  orders ready: {}", report.orders.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unique_order_numbers_keep_first_seen_order() {
        let orders = vec![
            SearchRecord::new(json!({"orderNo": "B"})),
            SearchRecord::new(json!({"orderNo": "A"})),
            SearchRecord::new(json!({"orderNo": "B"})),
            SearchRecord::new(json!({"name": "no key"})),
        ];
        assert_eq!(unique_order_numbers(&orders), vec!["B", "A"]);
    }

    #[test]
    fn utc_range_is_taken_verbatim() {
        let d = |s| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let range = resolve_range(d("2024-01-01"), d("2024-01-31"), true).unwrap();
        assert_eq!(range.start_param(), "2024-01-01");
        assert_eq!(range.end_param(), "2024-01-31");
        assert!(resolve_range(d("2024-02-01"), d("2024-01-31"), true).is_err());
    }
}
