//! The order provider seam.
//!
//! Everything upstream of reconciliation talks to the external dispatch
//! provider through [`OrderProvider`]. [`ProviderClient`](crate::provider::ProviderClient)
//! is the HTTP implementation; tests script their own.
//!
//! ```text
//!   OrderProvider::search_page ──▶ pager ──┐
//!                                         ├──▶ merge ─▶ filter ─▶ dedup ─▶ normalize
//!   OrderProvider::completion_batch ──▶ completion fetcher ─┘
//! ```

use async_trait::async_trait;

use fieldqc_core::models::{CompletionRecord, DateRange, SearchRecord};

use crate::error::FetchError;

/// One page from the search endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub orders: Vec<SearchRecord>,
    /// Continuation token. `None` means this was the last page.
    pub after_tag: Option<String>,
}

/// A source of search and completion records.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use fieldqc::error::FetchError;
/// use fieldqc::traits::{OrderProvider, SearchPage};
/// use fieldqc_core::models::{CompletionRecord, DateRange};
///
/// struct EmptyProvider;
///
/// #[async_trait]
/// impl OrderProvider for EmptyProvider {
///     async fn search_page(
///         &self,
///         _range: &DateRange,
///         _after_tag: Option<&str>,
///     ) -> Result<SearchPage, FetchError> {
///         Ok(SearchPage::default())
///     }
///
///     async fn completion_batch(
///         &self,
///         _order_numbers: &[String],
///     ) -> Result<Vec<CompletionRecord>, FetchError> {
///         Ok(vec![])
///     }
/// }
/// ```
#[async_trait]
pub trait OrderProvider: Send + Sync {
    /// Fetch one page of orders for `range`. Pass the previous page's
    /// `after_tag` to continue; `None` requests the first page.
    async fn search_page(
        &self,
        range: &DateRange,
        after_tag: Option<&str>,
    ) -> Result<SearchPage, FetchError>;

    /// Fetch completion details for a batch of order numbers.
    async fn completion_batch(
        &self,
        order_numbers: &[String],
    ) -> Result<Vec<CompletionRecord>, FetchError>;
}
