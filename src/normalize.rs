use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::metrics::{MetricPoint, ALL_CAMPUSES};
use crate::period::PeriodType;

/// A raw gateway row: a JSON object whose field names vary per metric.
pub type RawRow = Map<String, Value>;

/// Extracts the metric-specific numeric field from a raw row. Supplied per
/// metric family so the normalizer stays metric-agnostic.
pub type ValueAccessor = fn(&RawRow) -> Option<&Value>;

/// Field names the backends use for the period bucket, in precedence order.
const DATE_FIELDS: &[&str] = &["period_date", "period", "date"];

/// Field names the backends use for the campus dimension.
const CAMPUS_FIELDS: &[&str] = &["campus_name", "campus"];

/// Map raw gateway rows to canonical points.
///
/// Missing campus → the "All Campuses" sentinel; null or non-numeric values
/// (including string numbers that fail to parse) → 0; rows whose period
/// date cannot be parsed are dropped with a warning, never silently folded
/// into totals.
pub fn normalize_rows(
    rows: &[Value],
    period_type: PeriodType,
    accessor: ValueAccessor,
) -> Vec<MetricPoint> {
    let mut points = Vec::with_capacity(rows.len());
    for row in rows {
        match normalize_row(row, period_type, accessor) {
            Ok(point) => points.push(point),
            Err(e) => log::warn!("Dropping unparseable row: {e}"),
        }
    }
    points
}

fn normalize_row(row: &Value, period_type: PeriodType, accessor: ValueAccessor) -> Result<MetricPoint> {
    let obj = row
        .as_object()
        .ok_or_else(|| Error::Normalization(format!("row is not an object: {row}")))?;

    let date = parse_period_date(obj)?;
    let period_date = period_type.bucket_start(date);

    let campus_name = CAMPUS_FIELDS
        .iter()
        .find_map(|f| obj.get(*f))
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(ALL_CAMPUSES)
        .to_string();

    let value = coerce_value(accessor(obj));

    Ok(MetricPoint {
        period_type,
        period_date,
        display_label: period_type.display_label(period_date),
        campus_name,
        value,
    })
}

fn parse_period_date(obj: &RawRow) -> Result<NaiveDate> {
    let raw = DATE_FIELDS
        .iter()
        .find_map(|f| obj.get(*f))
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Normalization("row has no period date field".into()))?;

    // Plain dates first, then full timestamps truncated to their UTC date.
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(d);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.to_utc().date_naive());
    }
    Err(Error::Normalization(format!("unparseable period date: {raw}")))
}

/// Coerce a raw value to a non-negative number. Null, absent, or
/// unparseable values become 0.
fn coerce_value(value: Option<&Value>) -> f64 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    n.max(0.0)
}
