use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::Serialize;

use crate::error::{Error, Result};

/// The bucketing granularity for time-series metrics.
///
/// Every caller truncates dates through [`PeriodType::bucket_start`] so that
/// period keys align across metrics when overlaid on one chart. Weeks start
/// on Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Day,
    #[default]
    Week,
    Month,
}

impl PeriodType {
    /// Parse a period type string: `day`, `week`, or `month`.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "day" | "d" => Ok(PeriodType::Day),
            "week" | "w" => Ok(PeriodType::Week),
            "month" | "m" => Ok(PeriodType::Month),
            other => Err(Error::Request(format!("unrecognized period type: {other}"))),
        }
    }

    /// The unit name used when building a backend date-filter expression.
    pub fn interval_unit(&self) -> &'static str {
        match self {
            PeriodType::Day => "day",
            PeriodType::Week => "week",
            PeriodType::Month => "month",
        }
    }

    /// Canonical start of the bucket containing `date`.
    ///
    /// Day buckets are the date itself, week buckets start Sunday, month
    /// buckets start on the 1st.
    pub fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            PeriodType::Day => date,
            PeriodType::Week => {
                date - Duration::days(date.weekday().num_days_from_sunday() as i64)
            }
            PeriodType::Month => date.with_day(1).unwrap_or(date),
        }
    }

    /// The bucket start `n` periods before `date` (which is truncated first).
    pub fn step_back(&self, date: NaiveDate, n: u32) -> NaiveDate {
        let start = self.bucket_start(date);
        match self {
            PeriodType::Day => start - Duration::days(n as i64),
            PeriodType::Week => start - Duration::weeks(n as i64),
            PeriodType::Month => start - Months::new(n),
        }
    }

    /// Earliest bucket to include for a lookback window ending today:
    /// today truncated to the period, minus `lookback_units` periods.
    pub fn lookback_floor(&self, today: NaiveDate, lookback_units: u32) -> NaiveDate {
        self.step_back(today, lookback_units)
    }

    /// The most recent `n` bucket starts up to and including the bucket
    /// containing `today`, ordered oldest to newest.
    pub fn buckets_through(&self, today: NaiveDate, n: u32) -> Vec<NaiveDate> {
        (0..n).rev().map(|i| self.step_back(today, i)).collect()
    }

    /// Human display label for a bucket start, e.g. `Jan 5`, `Week of Jan 5`,
    /// `Jan 2026`.
    pub fn display_label(&self, bucket: NaiveDate) -> String {
        match self {
            PeriodType::Day => bucket.format("%b %-d").to_string(),
            PeriodType::Week => format!("Week of {}", bucket.format("%b %-d")),
            PeriodType::Month => bucket.format("%b %Y").to_string(),
        }
    }
}

impl std::fmt::Display for PeriodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.interval_unit())
    }
}
