//! Core data models used throughout fieldqc.
//!
//! Raw provider payloads are kept as minimally-typed envelopes
//! ([`SearchRecord`], [`CompletionRecord`]) around a `serde_json::Value`, so
//! the normalizer in [`crate::normalize`] can probe the known schema variants
//! without losing anything that has to be stored verbatim for audit.
//!
//! Everything here is created fresh for a single fetch or import operation.
//! Only [`CanonicalOrder`]s outlive an operation, and only through an
//! [`OrderStore`](crate::store::OrderStore).

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::normalize;

/// Completion outcomes accepted by the status filter when none are configured.
pub const DEFAULT_VALID_STATUSES: [&str; 3] = ["success", "failed", "rejected"];

/// Completion status of work that has not happened yet. Never a terminal outcome.
pub const SCHEDULED_STATUS: &str = "scheduled";

// ═══════════════════════════════════════════════════════════════════════
// Date range
// ═══════════════════════════════════════════════════════════════════════

/// Inclusive calendar date range sent to the search endpoint.
///
/// Both bounds are UTC calendar dates and serialize as `yyyy-MM-dd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    /// Build a range from two UTC dates. Fails when `from` is after `to`.
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if from > to {
            bail!("date range start {} is after end {}", from, to);
        }
        Ok(Self { from, to })
    }

    /// Convert a calendar selection made in a local timezone to UTC dates.
    ///
    /// The start bound is local midnight of `from`, the end bound is local
    /// 23:59:59 of `to`; each is shifted to UTC and its UTC calendar date is
    /// used. East of UTC this moves the start back a day, west of UTC it
    /// moves the end forward a day, so orders near midnight are not lost.
    pub fn from_local_dates(from: NaiveDate, to: NaiveDate, offset: FixedOffset) -> Result<Self> {
        let shift = Duration::seconds(i64::from(offset.local_minus_utc()));
        let start = from
            .and_time(NaiveTime::MIN)
            .checked_sub_signed(shift)
            .with_context(|| format!("start date {} is out of range", from))?;
        let end = to
            .and_time(NaiveTime::MIN)
            .checked_add_signed(Duration::days(1) - Duration::seconds(1))
            .and_then(|end| end.checked_sub_signed(shift))
            .with_context(|| format!("end date {} is out of range", to))?;
        Self::new(start.date(), end.date())
    }

    /// The `from` bound formatted for the provider (`yyyy-MM-dd`).
    pub fn start_param(&self) -> String {
        self.from.format("%Y-%m-%d").to_string()
    }

    /// The `to` bound formatted for the provider (`yyyy-MM-dd`).
    pub fn end_param(&self) -> String {
        self.to.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start_param(), self.end_param())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Raw provider records
// ═══════════════════════════════════════════════════════════════════════

/// An order as returned by the provider's date-range search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchRecord {
    pub payload: Value,
}

impl SearchRecord {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    /// Order number found by the normalizer's fallback chain, if any.
    pub fn order_no(&self) -> Option<String> {
        normalize::order_number(&self.payload)
    }
}

/// Completion details for one order, as returned by the completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    /// Order number this record belongs to.
    pub order_no: String,
    /// The provider's own success indicator for this record.
    pub success: bool,
    /// The record exactly as the provider sent it.
    pub payload: Value,
}

impl CompletionRecord {
    /// Wrap a raw completion payload.
    ///
    /// The record's own `success` flag wins; when it carries none, the
    /// response envelope's flag is inherited. Returns `None` when no order
    /// number can be extracted, since such a record cannot be joined.
    pub fn from_payload(payload: Value, envelope_success: bool) -> Option<Self> {
        let order_no = normalize::order_number(&payload)?;
        let success = payload
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(envelope_success);
        Some(Self {
            order_no,
            success,
            payload,
        })
    }

    /// Whether the payload carries a non-null `data` section.
    pub fn has_data(&self) -> bool {
        normalize::completion_data(&self.payload).is_some()
    }
}

/// A search record left-joined with its completion record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedOrder {
    pub search: SearchRecord,
    pub completion: Option<CompletionRecord>,
    /// Lowercased completion status, resolved once at merge time.
    pub completion_status: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════
// Canonical order
// ═══════════════════════════════════════════════════════════════════════

/// QC workflow state of an order. Editable by reviewers, unlike the
/// provider's `completion_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QcStatus {
    Imported,
    Completed,
    Approved,
    Flagged,
    Resolved,
    Rejected,
}

impl QcStatus {
    /// Initial QC state derived from the provider's completion status.
    pub fn from_completion(completion_status: Option<&str>) -> Self {
        match completion_status {
            Some(s) if s.eq_ignore_ascii_case("success") => QcStatus::Completed,
            Some(s) if s.eq_ignore_ascii_case("failed") => QcStatus::Rejected,
            _ => QcStatus::Imported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QcStatus::Imported => "imported",
            QcStatus::Completed => "completed",
            QcStatus::Approved => "approved",
            QcStatus::Flagged => "flagged",
            QcStatus::Resolved => "resolved",
            QcStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for QcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QcStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "imported" => Ok(QcStatus::Imported),
            "completed" => Ok(QcStatus::Completed),
            "approved" => Ok(QcStatus::Approved),
            "flagged" => Ok(QcStatus::Flagged),
            "resolved" => Ok(QcStatus::Resolved),
            "rejected" => Ok(QcStatus::Rejected),
            other => bail!("unknown QC status: '{}'", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    pub id: Option<String>,
    pub name: String,
}

/// Normalized, UI-ready order produced by [`normalize::extract_canonical`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalOrder {
    pub id: String,
    pub order_no: Option<String>,
    pub status: QcStatus,
    pub service_date: DateTime<Utc>,
    pub service_notes: Option<String>,
    pub tech_notes: Option<String>,
    pub notes: Option<String>,
    pub location: Location,
    pub driver: Driver,
    pub has_images: bool,
    pub signature_url: Option<String>,
    pub tracking_url: Option<String>,
    pub completion_status: Option<String>,
    pub raw_search: Value,
    pub raw_completion: Option<Value>,
}

// ═══════════════════════════════════════════════════════════════════════
// Operation results
// ═══════════════════════════════════════════════════════════════════════

/// A completion batch that failed as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchError {
    /// Zero-based position of the batch in the partition.
    pub batch_index: usize,
    /// Number of order numbers the batch carried.
    pub order_count: usize,
    pub message: String,
}

/// Per-batch accounting for one completion fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    pub total_batches: usize,
    /// Batches that finished, whatever their outcome.
    pub completed_batches: usize,
    pub successful_batches: usize,
    pub failed_batches: usize,
    /// Completion records returned by successful batches.
    pub total_orders_processed: usize,
    pub errors: Vec<BatchError>,
}

impl BatchStats {
    pub fn new(total_batches: usize) -> Self {
        Self {
            total_batches,
            ..Default::default()
        }
    }

    pub fn record_success(&mut self, orders: usize) {
        self.completed_batches += 1;
        self.successful_batches += 1;
        self.total_orders_processed += orders;
    }

    pub fn record_failure(&mut self, error: BatchError) {
        self.completed_batches += 1;
        self.failed_batches += 1;
        self.errors.push(error);
    }
}

/// A single order that could not be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportErrorDetail {
    pub order_no: Option<String>,
    pub message: String,
}

/// Outcome of persisting one import batch. Also the response body of the
/// import-batch endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchImportOutcome {
    pub imported: usize,
    pub duplicates: usize,
    pub errors: usize,
    #[serde(default)]
    pub error_details: Vec<ImportErrorDetail>,
}

/// Running totals for one import operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub success: bool,
    pub total: usize,
    pub imported: usize,
    pub duplicates: usize,
    pub errors: usize,
    pub error_details: Vec<ImportErrorDetail>,
}

impl ImportResult {
    /// Empty result for an import of `total` orders.
    pub fn new(total: usize) -> Self {
        Self {
            success: true,
            total,
            imported: 0,
            duplicates: 0,
            errors: 0,
            error_details: Vec::new(),
        }
    }

    /// Fold one batch outcome into the running totals.
    pub fn absorb(&mut self, outcome: BatchImportOutcome) {
        self.imported += outcome.imported;
        self.duplicates += outcome.duplicates;
        self.errors += outcome.errors;
        self.error_details.extend(outcome.error_details);
        self.success = self.errors == 0;
    }

    /// Count every order of a batch that failed as a whole.
    pub fn absorb_failed_batch(&mut self, orders: &[CanonicalOrder], message: &str) {
        self.errors += orders.len();
        self.error_details
            .extend(orders.iter().map(|order| ImportErrorDetail {
                order_no: order.order_no.clone(),
                message: message.to_string(),
            }));
        self.success = self.errors == 0;
    }

    /// Orders already accounted for (imported, duplicate, or failed).
    pub fn processed(&self) -> usize {
        self.imported + self.duplicates + self.errors
    }
}

/// Import progress after a batch completes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImportProgress {
    pub current: usize,
    pub total: usize,
    pub percentage: f64,
}

impl ImportProgress {
    pub fn new(current: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            100.0
        } else {
            (current as f64 / total as f64 * 1000.0).round() / 10.0
        };
        Self {
            current,
            total,
            percentage,
        }
    }
}
