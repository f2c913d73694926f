use std::hash::{DefaultHasher, Hash, Hasher};

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::fetch::{MetricKind, RetrievalRequest};
use crate::metrics::{build_series, CampusTotalPolicy, MetricPoint, MetricSeries};

/// Campus roster used when a degraded request has no campus filter.
pub const DEFAULT_CAMPUSES: &[&str] = &["Atlanta", "Austin", "Chicago", "Denver"];

/// Generate a placeholder series after every real tier has failed.
///
/// The RNG is seeded from the request parameters, so fixed inputs
/// reproduce the same values: periods, campuses, and every point are
/// stable run to run. Stock metrics (`Latest` policy) get per-campus
/// monotonic non-decreasing values; flow metrics stay non-negative.
pub fn synthesize(
    kind: MetricKind,
    request: &RetrievalRequest,
    today: NaiveDate,
) -> Result<MetricSeries> {
    let config = kind.config();
    if request.lookback_units == 0 {
        return Err(Error::Synthesis(format!(
            "{}: cannot synthesize a zero-period window",
            config.name
        )));
    }
    let campuses: Vec<&str> = match request.campus_filter.as_deref() {
        Some(campus) if campus.trim().is_empty() => {
            return Err(Error::Synthesis(format!(
                "{}: cannot synthesize for a blank campus",
                config.name
            )))
        }
        Some(campus) => vec![campus],
        None => DEFAULT_CAMPUSES.to_vec(),
    };

    let buckets = request
        .period_type
        .buckets_through(today, request.lookback_units);
    let mut rng = StdRng::seed_from_u64(seed_for(kind, request));

    let mut points = Vec::with_capacity(buckets.len() * campuses.len());
    for campus in &campuses {
        let campus_scale: f64 = rng.random_range(0.6..1.3);
        let mut running = config.base_magnitude * campus_scale * rng.random_range(0.7..1.0);

        for &bucket in &buckets {
            let value = match config.campus_total_policy {
                CampusTotalPolicy::Sum => {
                    (config.base_magnitude * campus_scale * rng.random_range(0.5..1.5)).round()
                }
                CampusTotalPolicy::Latest => {
                    running += config.base_magnitude * campus_scale * rng.random_range(0.0..0.08);
                    running.round()
                }
            };
            points.push(MetricPoint {
                period_type: request.period_type,
                period_date: bucket,
                display_label: request.period_type.display_label(bucket),
                campus_name: campus.to_string(),
                value,
            });
        }
    }

    Ok(build_series(
        points,
        request.period_type,
        config.campus_total_policy,
    ))
}

fn seed_for(kind: MetricKind, request: &RetrievalRequest) -> u64 {
    let mut hasher = DefaultHasher::new();
    kind.config().name.hash(&mut hasher);
    request.period_type.interval_unit().hash(&mut hasher);
    request.lookback_units.hash(&mut hasher);
    request.campus_filter.hash(&mut hasher);
    hasher.finish()
}
