//! Search pagination.
//!
//! Follows the provider's `after_tag` continuation token page by page until
//! a page comes back without one. Pages are strictly sequential since each
//! request needs the previous response's token.
//!
//! A hard page ceiling bounds the run. Hitting it is not an error: the
//! collected orders are returned with `truncated` set and a warning logged.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fieldqc_core::models::{DateRange, SearchRecord};

use crate::error::FetchError;
use crate::progress::{PipelineProgressReporter, ProgressEvent};
use crate::traits::OrderProvider;

/// Everything the pager collected.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub orders: Vec<SearchRecord>,
    /// Requests issued, including a failed last one.
    pub pages: usize,
    /// The page ceiling stopped pagination while more pages were available.
    pub truncated: bool,
    /// The page failure that aborted pagination, if any. `orders` still
    /// holds everything collected before it.
    pub error: Option<FetchError>,
}

impl SearchOutcome {
    /// Turn an aborted run into an `Err`, logging what is discarded.
    pub fn into_result(self) -> Result<Self, FetchError> {
        match self.error {
            Some(err) => {
                warn!(
                    collected = self.orders.len(),
                    pages = self.pages,
                    error = %err,
                    "search aborted"
                );
                Err(err)
            }
            None => Ok(self),
        }
    }
}

pub async fn collect_all_search_results(
    provider: &dyn OrderProvider,
    range: &DateRange,
    max_pages: usize,
    cancel: &CancellationToken,
    progress: &dyn PipelineProgressReporter,
) -> SearchOutcome {
    let mut outcome = SearchOutcome::default();
    let mut after_tag: Option<String> = None;

    loop {
        if outcome.pages >= max_pages {
            outcome.truncated = true;
            warn!(
                max_pages,
                collected = outcome.orders.len(),
                range = %range,
                "search page ceiling reached, results may be incomplete"
            );
            break;
        }

        outcome.pages += 1;
        debug!(page = outcome.pages, after_tag = ?after_tag, "fetching search page");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            page = provider.search_page(range, after_tag.as_deref()) => page,
        };

        let page = match result {
            Ok(page) => page,
            Err(err) => {
                outcome.error = Some(err);
                break;
            }
        };

        let fetched = page.orders.len();
        outcome.orders.extend(page.orders);
        progress.report(ProgressEvent::SearchPage {
            page: outcome.pages,
            fetched,
            total: outcome.orders.len(),
        });

        match page.after_tag {
            Some(tag) => after_tag = Some(tag),
            None => break,
        }
    }

    info!(
        pages = outcome.pages,
        orders = outcome.orders.len(),
        truncated = outcome.truncated,
        "search complete"
    );
    outcome
}
