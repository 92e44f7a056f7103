//! Batched completion fetching.
//!
//! Order numbers are split into batches of at most
//! [`MAX_COMPLETION_BATCH`](crate::config::MAX_COMPLETION_BATCH) and fetched
//! concurrently from a [`JoinSet`]. A [`Semaphore`] bounds how many requests
//! are in flight, every request runs under its own timeout, and a
//! [`CancellationToken`] stops batches that have not finished yet.
//!
//! A failed batch never affects its siblings: it is recorded in
//! [`CompletionFetch::errors`] and contributes no records.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fieldqc_core::models::{BatchError, BatchStats, CompletionRecord};

use crate::config::{PipelineConfig, ProviderConfig, MAX_COMPLETION_BATCH};
use crate::error::FetchError;
use crate::progress::{PipelineProgressReporter, ProgressEvent};
use crate::traits::OrderProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionOptions {
    pub batch_size: usize,
    pub max_concurrent: usize,
    pub timeout: Duration,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            batch_size: MAX_COMPLETION_BATCH,
            max_concurrent: 8,
            timeout: Duration::from_secs(60),
        }
    }
}

impl CompletionOptions {
    pub fn from_config(pipeline: &PipelineConfig, provider: &ProviderConfig) -> Self {
        Self {
            batch_size: pipeline.completion_batch_size,
            max_concurrent: pipeline.max_concurrent_batches,
            timeout: provider.completion_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletionFetch {
    /// True when any record came back, or when no batch failed.
    pub success: bool,
    /// Records from successful batches, in batch order.
    pub orders: Vec<CompletionRecord>,
    pub batch_stats: BatchStats,
    pub errors: Vec<BatchError>,
}

type BatchOutput = (usize, usize, Result<Vec<CompletionRecord>, FetchError>);

async fn run_batch(
    provider: Arc<dyn OrderProvider>,
    batch: Vec<String>,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
    cancel: CancellationToken,
) -> Result<Vec<CompletionRecord>, FetchError> {
    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(FetchError::Cancelled),
        permit = semaphore.acquire_owned() => permit.map_err(|_| FetchError::Cancelled)?,
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        result = tokio::time::timeout(timeout, provider.completion_batch(&batch)) => {
            result.unwrap_or(Err(FetchError::Timeout(timeout)))
        }
    }
}

pub async fn fetch_completion_details(
    provider: Arc<dyn OrderProvider>,
    order_numbers: &[String],
    options: CompletionOptions,
    cancel: &CancellationToken,
    progress: &dyn PipelineProgressReporter,
) -> CompletionFetch {
    let batch_size = options.batch_size.clamp(1, MAX_COMPLETION_BATCH);
    let batches: Vec<Vec<String>> = order_numbers
        .chunks(batch_size)
        .map(<[String]>::to_vec)
        .collect();
    let total = batches.len();
    let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();

    info!(
        orders = order_numbers.len(),
        batches = total,
        max_concurrent = options.max_concurrent,
        "fetching completion details"
    );

    let semaphore = Arc::new(Semaphore::new(options.max_concurrent.max(1)));
    let mut set: JoinSet<BatchOutput> = JoinSet::new();
    for (index, batch) in batches.into_iter().enumerate() {
        let provider = Arc::clone(&provider);
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        let timeout = options.timeout;
        set.spawn(async move {
            let count = batch.len();
            let result = run_batch(provider, batch, semaphore, timeout, cancel).await;
            (index, count, result)
        });
    }

    let mut stats = BatchStats::new(total);
    let mut per_batch: Vec<Option<Vec<CompletionRecord>>> = vec![None; total];
    let mut finished = vec![false; total];
    let mut panics: Vec<String> = Vec::new();

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, _, Ok(records))) => {
                debug!(batch = index, records = records.len(), "completion batch done");
                finished[index] = true;
                stats.record_success(records.len());
                per_batch[index] = Some(records);
            }
            Ok((index, count, Err(err))) => {
                warn!(batch = index, orders = count, error = %err, "completion batch failed");
                finished[index] = true;
                stats.record_failure(BatchError {
                    batch_index: index,
                    order_count: count,
                    message: err.to_string(),
                });
            }
            Err(join_err) => {
                warn!(error = %join_err, "completion batch task aborted");
                panics.push(join_err.to_string());
                continue;
            }
        }
        progress.report(ProgressEvent::CompletionBatch {
            completed: stats.completed_batches,
            total,
            failed: stats.failed_batches,
        });
    }

    // Tasks that died without reporting map onto the batches nobody finished.
    let unfinished = (0..total).filter(|&i| !finished[i]);
    for (index, message) in unfinished.zip(panics) {
        stats.record_failure(BatchError {
            batch_index: index,
            order_count: sizes[index],
            message,
        });
    }

    let orders: Vec<CompletionRecord> = per_batch.into_iter().flatten().flatten().collect();
    let mut errors = stats.errors.clone();
    errors.sort_by_key(|e| e.batch_index);
    let success = !orders.is_empty() || errors.is_empty();

    info!(
        batches = total,
        failed = stats.failed_batches,
        records = orders.len(),
        "completion fetch finished"
    );

    CompletionFetch {
        success,
        orders,
        batch_stats: stats,
        errors,
    }
}
