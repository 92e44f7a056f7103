//! Completion-outcome filtering.
//!
//! A merged order passes when all of the following hold, checked in this
//! order (the first failing check is the one counted in the breakdown):
//!
//! 1. a completion record is attached,
//! 2. the record's own `success` indicator is true,
//! 3. the record carries a `data` section,
//! 4. the status is not `scheduled` (never terminal, whatever the allow-list says),
//! 5. the status is in the allow-list (case-insensitive),
//! 6. for `success` and `failed`, both a start and an end time are present.

use serde::{Deserialize, Serialize};

use crate::models::{MergedOrder, DEFAULT_VALID_STATUSES, SCHEDULED_STATUS};
use crate::normalize;

/// Why a merged order was filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NoCompletion,
    CompletionUnsuccessful,
    MissingData,
    Scheduled,
    StatusNotAllowed,
    MissingTimestamps,
}

/// Per-check rejection counts for one filter pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterBreakdown {
    pub total: usize,
    pub passed: usize,
    pub no_completion: usize,
    pub completion_unsuccessful: usize,
    pub missing_data: usize,
    pub scheduled: usize,
    pub status_not_allowed: usize,
    pub missing_timestamps: usize,
}

impl FilterBreakdown {
    fn record(&mut self, reason: RejectReason) {
        match reason {
            RejectReason::NoCompletion => self.no_completion += 1,
            RejectReason::CompletionUnsuccessful => self.completion_unsuccessful += 1,
            RejectReason::MissingData => self.missing_data += 1,
            RejectReason::Scheduled => self.scheduled += 1,
            RejectReason::StatusNotAllowed => self.status_not_allowed += 1,
            RejectReason::MissingTimestamps => self.missing_timestamps += 1,
        }
    }

    pub fn rejected(&self) -> usize {
        self.total - self.passed
    }
}

/// Orders that passed, plus the breakdown of those that did not.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub orders: Vec<MergedOrder>,
    pub breakdown: FilterBreakdown,
}

/// Allow-list of completion statuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFilter {
    valid: Vec<String>,
}

impl Default for StatusFilter {
    fn default() -> Self {
        Self::new(DEFAULT_VALID_STATUSES)
    }
}

impl StatusFilter {
    pub fn new<I, S>(valid: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            valid: valid
                .into_iter()
                .map(|s| s.as_ref().trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn valid_statuses(&self) -> &[String] {
        &self.valid
    }

    fn allows(&self, status: &str) -> bool {
        self.valid.iter().any(|v| v.eq_ignore_ascii_case(status))
    }

    /// Check one order. `Ok(())` means it passes.
    pub fn classify(&self, order: &MergedOrder) -> Result<(), RejectReason> {
        let completion = order.completion.as_ref().ok_or(RejectReason::NoCompletion)?;
        if !completion.success {
            return Err(RejectReason::CompletionUnsuccessful);
        }
        if !completion.has_data() {
            return Err(RejectReason::MissingData);
        }

        let status = normalize::completion_status(&completion.payload)
            .or_else(|| order.completion_status.clone())
            .ok_or(RejectReason::StatusNotAllowed)?;
        if status == SCHEDULED_STATUS {
            return Err(RejectReason::Scheduled);
        }
        if !self.allows(&status) {
            return Err(RejectReason::StatusNotAllowed);
        }

        if status == "success" || status == "failed" {
            let started = normalize::start_time(&completion.payload).is_some();
            let ended = normalize::end_time(&completion.payload).is_some();
            if !(started && ended) {
                return Err(RejectReason::MissingTimestamps);
            }
        }
        Ok(())
    }

    /// Keep the orders that pass. The input is left untouched.
    pub fn apply(&self, merged: &[MergedOrder]) -> FilterOutcome {
        let mut breakdown = FilterBreakdown {
            total: merged.len(),
            ..Default::default()
        };
        let mut orders = Vec::new();
        for order in merged {
            match self.classify(order) {
                Ok(()) => {
                    breakdown.passed += 1;
                    orders.push(order.clone());
                }
                Err(reason) => breakdown.record(reason),
            }
        }
        FilterOutcome { orders, breakdown }
    }
}

/// Filter merged orders against `valid_statuses`.
pub fn filter_by_status<S: AsRef<str>>(merged: &[MergedOrder], valid_statuses: &[S]) -> FilterOutcome {
    StatusFilter::new(valid_statuses).apply(merged)
}
