use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::period::PeriodType;

/// Sentinel campus for rows that arrive without one. Counted in period
/// totals but never listed as a real campus.
pub const ALL_CAMPUSES: &str = "All Campuses";

/// Sentinel emitted by the backend when a row could not be attributed to a
/// campus. Excluded from the campus list (unless it is the only campus),
/// still counted in period totals.
pub const NO_CAMPUS_MATCH: &str = "No Campus Match";

/// How per-campus totals are computed across the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CampusTotalPolicy {
    /// Flow metrics (leads created, opportunities): sum every point.
    #[default]
    Sum,
    /// Stock metrics (cumulative ARR, total enrolled): the value at the
    /// campus's most recent period. Ties on the same date resolve to the
    /// later point in input order; the backends emit one row per
    /// (period, campus) so true ties do not occur in practice.
    Latest,
}

/// One canonical observation: a value for a (period, campus) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPoint {
    pub period_type: PeriodType,
    /// Bucket start date, timezone-naive, already truncated to the period.
    pub period_date: NaiveDate,
    pub display_label: String,
    /// Never empty; a missing campus is normalized to [`ALL_CAMPUSES`].
    pub campus_name: String,
    /// Never negative.
    pub value: f64,
}

/// Period-over-period deltas keyed by period, oldest period always 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeriesChanges {
    pub raw: BTreeMap<NaiveDate, f64>,
    pub percentage: BTreeMap<NaiveDate, f64>,
}

/// One entry in the chart-ready series, oldest to newest, with a dense
/// per-campus breakdown (absent combinations are 0, not omitted).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesEntry {
    pub period: NaiveDate,
    pub display_label: String,
    pub total: f64,
    pub campus_breakdown: BTreeMap<String, f64>,
}

/// The canonical aggregated response: a read-only view over a point set.
///
/// Built fresh each fetch cycle by [`crate::metrics::build_series`]; never
/// mutated afterwards. Empty input yields empty collections, a `None`
/// latest period and a 0 latest total, so callers can render an empty state
/// without null-checking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSeries {
    /// Distinct period bucket starts, newest first.
    pub periods: Vec<NaiveDate>,
    /// Distinct campuses, [`NO_CAMPUS_MATCH`] excluded unless it is the
    /// only campus present.
    pub campuses: Vec<String>,
    /// Per-period totals across all campuses.
    pub totals: BTreeMap<NaiveDate, f64>,
    /// Per-campus totals across the window, per the metric's policy.
    pub campus_totals: BTreeMap<String, f64>,
    pub changes: SeriesChanges,
    pub latest_period: Option<NaiveDate>,
    pub latest_total: f64,
    /// Oldest-to-newest entries for charting (reverse of `periods`).
    pub time_series: Vec<TimeSeriesEntry>,
    #[serde(skip)]
    points: Vec<MetricPoint>,
}

impl MetricSeries {
    pub(crate) fn new(
        periods: Vec<NaiveDate>,
        campuses: Vec<String>,
        totals: BTreeMap<NaiveDate, f64>,
        campus_totals: BTreeMap<String, f64>,
        changes: SeriesChanges,
        time_series: Vec<TimeSeriesEntry>,
        points: Vec<MetricPoint>,
    ) -> Self {
        let latest_period = periods.first().copied();
        let latest_total = latest_period
            .and_then(|p| totals.get(&p).copied())
            .unwrap_or(0.0);
        Self {
            periods,
            campuses,
            totals,
            campus_totals,
            changes,
            latest_period,
            latest_total,
            time_series,
            points,
        }
    }

    /// Exact point value for a (period, campus) pair, or 0 if absent.
    ///
    /// Linear scan; windows are bounded to low-double-digit periods across
    /// single-digit campuses.
    pub fn lookup(&self, period: NaiveDate, campus: &str) -> f64 {
        self.points
            .iter()
            .find(|p| p.period_date == period && p.campus_name == campus)
            .map(|p| p.value)
            .unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }
}
