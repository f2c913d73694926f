pub mod types;

pub use types::*;

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::period::PeriodType;

/// Aggregate canonical points into a [`MetricSeries`].
///
/// Periods come out newest-first, campuses deduplicated with the
/// no-match sentinel dropped (unless it is the only campus), period totals
/// summed across campuses, campus totals per `policy`, and a dense
/// oldest-to-newest time series for charting.
pub fn build_series(
    points: Vec<MetricPoint>,
    period_type: PeriodType,
    policy: CampusTotalPolicy,
) -> MetricSeries {
    let mut periods: Vec<NaiveDate> = points
        .iter()
        .map(|p| p.period_date)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    periods.reverse();

    let seen: BTreeSet<&str> = points.iter().map(|p| p.campus_name.as_str()).collect();
    let mut campuses: Vec<String> = seen
        .iter()
        .filter(|c| **c != NO_CAMPUS_MATCH)
        .map(|c| c.to_string())
        .collect();
    if campuses.is_empty() && seen.contains(NO_CAMPUS_MATCH) {
        campuses.push(NO_CAMPUS_MATCH.to_string());
    }

    let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for p in &points {
        *totals.entry(p.period_date).or_insert(0.0) += p.value;
    }

    let mut campus_totals: BTreeMap<String, f64> = BTreeMap::new();
    for campus in &campuses {
        let total = match policy {
            CampusTotalPolicy::Sum => points
                .iter()
                .filter(|p| p.campus_name == *campus)
                .map(|p| p.value)
                .sum(),
            CampusTotalPolicy::Latest => {
                // Last point in input order at the campus's max date wins.
                let mut latest: Option<(NaiveDate, f64)> = None;
                for p in points.iter().filter(|p| p.campus_name == *campus) {
                    match latest {
                        Some((date, _)) if p.period_date < date => {}
                        _ => latest = Some((p.period_date, p.value)),
                    }
                }
                latest.map(|(_, v)| v).unwrap_or(0.0)
            }
        };
        campus_totals.insert(campus.clone(), total);
    }

    let time_series: Vec<TimeSeriesEntry> = periods
        .iter()
        .rev()
        .map(|&period| {
            let mut breakdown: BTreeMap<String, f64> = BTreeMap::new();
            for campus in &campuses {
                let value = points
                    .iter()
                    .filter(|p| p.period_date == period && p.campus_name == *campus)
                    .map(|p| p.value)
                    .sum();
                breakdown.insert(campus.clone(), value);
            }
            TimeSeriesEntry {
                period,
                display_label: period_type.display_label(period),
                total: totals.get(&period).copied().unwrap_or(0.0),
                campus_breakdown: breakdown,
            }
        })
        .collect();

    let changes = compute_changes(&periods, &totals);

    MetricSeries::new(
        periods,
        campuses,
        totals,
        campus_totals,
        changes,
        time_series,
        points,
    )
}

/// Period-over-period deltas, walking oldest to newest.
///
/// The oldest period has no predecessor; its raw and percentage change are
/// stored as 0 by policy (render as N/A, not a measured zero). Percentage
/// against a zero predecessor is 0 when the current total is also 0, else
/// 100 ("fully new") — one convention, applied uniformly.
pub fn compute_changes(
    periods_descending: &[NaiveDate],
    totals: &BTreeMap<NaiveDate, f64>,
) -> SeriesChanges {
    let mut changes = SeriesChanges::default();
    let mut previous: Option<f64> = None;

    for &period in periods_descending.iter().rev() {
        let current = totals.get(&period).copied().unwrap_or(0.0);
        match previous {
            None => {
                changes.raw.insert(period, 0.0);
                changes.percentage.insert(period, 0.0);
            }
            Some(prev) => {
                changes.raw.insert(period, current - prev);
                let pct = if prev == 0.0 {
                    if current == 0.0 {
                        0.0
                    } else {
                        100.0
                    }
                } else {
                    (current - prev) / prev * 100.0
                };
                changes.percentage.insert(period, pct);
            }
        }
        previous = Some(current);
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn point(date: NaiveDate, campus: &str, value: f64) -> MetricPoint {
        MetricPoint {
            period_type: PeriodType::Week,
            period_date: date,
            display_label: PeriodType::Week.display_label(date),
            campus_name: campus.to_string(),
            value,
        }
    }

    #[test]
    fn test_two_week_deltas() {
        let points = vec![
            point(d(2024, 1, 1), "Atlanta", 5.0),
            point(d(2024, 1, 8), "Atlanta", 8.0),
        ];
        let series = build_series(points, PeriodType::Week, CampusTotalPolicy::Sum);

        assert_eq!(series.periods, vec![d(2024, 1, 8), d(2024, 1, 1)]);
        assert_eq!(series.totals[&d(2024, 1, 8)], 8.0);
        assert_eq!(series.totals[&d(2024, 1, 1)], 5.0);
        assert_eq!(series.changes.raw[&d(2024, 1, 8)], 3.0);
        assert_eq!(series.changes.percentage[&d(2024, 1, 8)], 60.0);
        assert_eq!(series.latest_period, Some(d(2024, 1, 8)));
        assert_eq!(series.latest_total, 8.0);
    }

    #[test]
    fn test_empty_points() {
        let series = build_series(vec![], PeriodType::Week, CampusTotalPolicy::Sum);
        assert!(series.periods.is_empty());
        assert!(series.campuses.is_empty());
        assert!(series.totals.is_empty());
        assert!(series.time_series.is_empty());
        assert_eq!(series.latest_period, None);
        assert_eq!(series.latest_total, 0.0);
        assert_eq!(series.lookup(d(2024, 1, 1), "Atlanta"), 0.0);
        assert!(series.is_empty());
    }

    #[test]
    fn test_periods_strictly_descending_no_duplicates() {
        let points = vec![
            point(d(2024, 1, 8), "Atlanta", 1.0),
            point(d(2024, 1, 1), "Dallas", 2.0),
            point(d(2024, 1, 8), "Dallas", 3.0),
            point(d(2024, 1, 15), "Atlanta", 4.0),
        ];
        let series = build_series(points, PeriodType::Week, CampusTotalPolicy::Sum);
        assert_eq!(
            series.periods,
            vec![d(2024, 1, 15), d(2024, 1, 8), d(2024, 1, 1)]
        );
        for pair in series.periods.windows(2) {
            assert!(pair[0] > pair[1]);
        }
    }

    #[test]
    fn test_totals_sum_across_campuses() {
        let points = vec![
            point(d(2024, 1, 8), "Atlanta", 1.0),
            point(d(2024, 1, 8), "Dallas", 3.0),
        ];
        let series = build_series(points, PeriodType::Week, CampusTotalPolicy::Sum);
        assert_eq!(series.totals[&d(2024, 1, 8)], 4.0);
        assert_eq!(series.campus_totals["Atlanta"], 1.0);
        assert_eq!(series.campus_totals["Dallas"], 3.0);
    }

    #[test]
    fn test_no_campus_match_excluded_but_counted() {
        let points = vec![
            point(d(2024, 1, 8), "Atlanta", 1.0),
            point(d(2024, 1, 8), NO_CAMPUS_MATCH, 3.0),
        ];
        let series = build_series(points, PeriodType::Week, CampusTotalPolicy::Sum);
        assert_eq!(series.campuses, vec!["Atlanta".to_string()]);
        assert_eq!(series.totals[&d(2024, 1, 8)], 4.0);
    }

    #[test]
    fn test_no_campus_match_kept_when_only_campus() {
        let points = vec![point(d(2024, 1, 8), NO_CAMPUS_MATCH, 3.0)];
        let series = build_series(points, PeriodType::Week, CampusTotalPolicy::Sum);
        assert_eq!(series.campuses, vec![NO_CAMPUS_MATCH.to_string()]);
    }

    #[test]
    fn test_latest_policy_takes_newest_value() {
        let points = vec![
            point(d(2024, 1, 1), "Atlanta", 100.0),
            point(d(2024, 1, 8), "Atlanta", 140.0),
            point(d(2024, 1, 1), "Dallas", 50.0),
        ];
        let series = build_series(points, PeriodType::Week, CampusTotalPolicy::Latest);
        assert_eq!(series.campus_totals["Atlanta"], 140.0);
        assert_eq!(series.campus_totals["Dallas"], 50.0);
    }

    #[test]
    fn test_time_series_dense_and_ascending() {
        let points = vec![
            point(d(2024, 1, 1), "Atlanta", 5.0),
            point(d(2024, 1, 8), "Dallas", 8.0),
        ];
        let series = build_series(points, PeriodType::Week, CampusTotalPolicy::Sum);
        assert_eq!(series.time_series.len(), 2);
        assert_eq!(series.time_series[0].period, d(2024, 1, 1));
        assert_eq!(series.time_series[1].period, d(2024, 1, 8));

        // Missing (period, campus) combinations are 0, not omitted
        assert_eq!(series.time_series[0].campus_breakdown["Dallas"], 0.0);
        assert_eq!(series.time_series[1].campus_breakdown["Atlanta"], 0.0);
        assert_eq!(series.time_series[1].campus_breakdown["Dallas"], 8.0);
        assert_eq!(series.time_series[0].display_label, "Week of Jan 1");
    }

    #[test]
    fn test_build_series_idempotent() {
        let points = vec![
            point(d(2024, 1, 1), "Atlanta", 5.0),
            point(d(2024, 1, 8), "Atlanta", 8.0),
            point(d(2024, 1, 8), "Dallas", 2.0),
        ];
        let a = build_series(points.clone(), PeriodType::Week, CampusTotalPolicy::Sum);
        let b = build_series(points, PeriodType::Week, CampusTotalPolicy::Sum);
        assert_eq!(a, b);
    }

    #[test]
    fn test_lookup() {
        let points = vec![
            point(d(2024, 1, 1), "Atlanta", 5.0),
            point(d(2024, 1, 8), "Dallas", 8.0),
        ];
        let series = build_series(points, PeriodType::Week, CampusTotalPolicy::Sum);
        assert_eq!(series.lookup(d(2024, 1, 1), "Atlanta"), 5.0);
        assert_eq!(series.lookup(d(2024, 1, 1), "Dallas"), 0.0);
        assert_eq!(series.lookup(d(2024, 1, 15), "Atlanta"), 0.0);
    }

    #[test]
    fn test_changes_oldest_period_is_zero() {
        let mut totals = BTreeMap::new();
        totals.insert(d(2024, 1, 1), 5.0);
        totals.insert(d(2024, 1, 8), 8.0);
        let changes = compute_changes(&[d(2024, 1, 8), d(2024, 1, 1)], &totals);
        assert_eq!(changes.raw[&d(2024, 1, 1)], 0.0);
        assert_eq!(changes.percentage[&d(2024, 1, 1)], 0.0);
    }

    #[test]
    fn test_changes_zero_predecessor_conventions() {
        let mut totals = BTreeMap::new();
        totals.insert(d(2024, 1, 1), 0.0);
        totals.insert(d(2024, 1, 8), 0.0);
        totals.insert(d(2024, 1, 15), 4.0);
        let periods = [d(2024, 1, 15), d(2024, 1, 8), d(2024, 1, 1)];
        let changes = compute_changes(&periods, &totals);

        // 0 → 0 is 0% change; 0 → 4 is "fully new", 100%
        assert_eq!(changes.percentage[&d(2024, 1, 8)], 0.0);
        assert_eq!(changes.percentage[&d(2024, 1, 15)], 100.0);
        assert_eq!(changes.raw[&d(2024, 1, 15)], 4.0);
    }

    #[test]
    fn test_delta_round_trip() {
        let points = vec![
            point(d(2024, 1, 1), "Atlanta", 5.0),
            point(d(2024, 1, 8), "Atlanta", 8.0),
            point(d(2024, 1, 15), "Atlanta", 6.0),
        ];
        let series = build_series(points, PeriodType::Week, CampusTotalPolicy::Sum);

        // For every non-oldest period, previous total + raw change = total
        for pair in series.periods.windows(2) {
            let (newer, older) = (pair[0], pair[1]);
            assert_eq!(
                series.totals[&older] + series.changes.raw[&newer],
                series.totals[&newer]
            );
        }
    }

    #[test]
    fn test_negative_delta_percentage() {
        let mut totals = BTreeMap::new();
        totals.insert(d(2024, 1, 1), 10.0);
        totals.insert(d(2024, 1, 8), 5.0);
        let changes = compute_changes(&[d(2024, 1, 8), d(2024, 1, 1)], &totals);
        assert_eq!(changes.raw[&d(2024, 1, 8)], -5.0);
        assert_eq!(changes.percentage[&d(2024, 1, 8)], -50.0);
    }
}
