//! Value types that flow through the pipeline.
//!
//! - [`DateWindow`]: the inclusive calendar-day range a search covers
//! - [`QueryExpression`]: the composed search string sent to a backend
//! - [`NormalizedRecord`]: an accepted search result, ready for the sinks

use crate::error::MinerError;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag written to the `source` column of every record.
pub const SOURCE_TAG: &str = "google_search";

/// Inclusive range of calendar days a search is restricted to.
///
/// `start_date = today - days_back` and `end_date = today`, so a window is
/// never empty: `days_back = 0` covers exactly one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start_date: NaiveDate,
    end_date: NaiveDate,
    before: NaiveDate,
}

impl DateWindow {
    /// The window ending `today` and reaching back `days_back` days.
    pub fn trailing(today: NaiveDate, days_back: u32) -> Result<Self, MinerError> {
        let start_date = today
            .checked_sub_days(Days::new(u64::from(days_back)))
            .ok_or_else(|| {
                MinerError::config(format!("days_back {days_back} reaches before the calendar start"))
            })?;
        let before = today
            .checked_add_days(Days::new(1))
            .ok_or_else(|| MinerError::config("end date has no following day"))?;
        Ok(Self {
            start_date,
            end_date: today,
            before,
        })
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    /// Exclusive upper bound for `before:` filters: the day after `end_date`,
    /// so articles published on the last day are kept.
    pub fn before_bound(&self) -> NaiveDate {
        self.before
    }
}

/// A fully composed search expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryExpression(String);

impl QueryExpression {
    pub(crate) fn new(expression: String) -> Self {
        Self(expression)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One accepted search result.
///
/// Field order matches the CSV header: `url,domain_name,source`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NormalizedRecord {
    /// The article URL as returned by the search backend (trimmed).
    pub url: String,
    /// The label under the public suffix, e.g. `iol` for `www.iol.co.za`.
    pub domain_name: String,
    /// Always [`SOURCE_TAG`].
    pub source: String,
}

impl NormalizedRecord {
    pub fn new(url: impl Into<String>, domain_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            domain_name: domain_name.into(),
            source: SOURCE_TAG.to_string(),
        }
    }
}
