use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::Result;
use crate::fetch::{synth, MetricConfig, MetricKind, RetrievalRequest};
use crate::gateway::{Gateway, GatewayCall};
use crate::metrics::{build_series, MetricPoint, MetricSeries};
use crate::normalize::normalize_rows;

/// One attempt strategy in the degradation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    PrimaryRpc,
    FallbackQuery,
    Synthetic,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Tier::PrimaryRpc => "primary_rpc",
            Tier::FallbackQuery => "fallback_query",
            Tier::Synthetic => "synthetic",
        };
        write!(f, "{s}")
    }
}

/// A completed fetch cycle: the canonical series plus the tier that
/// actually served it. Synthetic data is shape-identical to real data;
/// the tier is the only way to tell them apart.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub series: MetricSeries,
    pub tier: Tier,
}

/// Run one fetch cycle for a metric: primary RPC, then the raw-query
/// fallback, then deterministic synthesis.
///
/// A tier is abandoned on gateway error or when it normalizes to zero
/// usable points (an all-zero but non-empty response is a success). No
/// tier is retried within a cycle, and the cycle always ends with a
/// series or a typed `Request`/`Synthesis` error — never a hung state.
pub async fn fetch_with_fallback(
    gateway: &dyn Gateway,
    kind: MetricKind,
    request: &RetrievalRequest,
    today: NaiveDate,
) -> Result<FetchOutcome> {
    request.validate()?;
    let config = kind.config();

    match attempt(gateway, &rpc_call(&config, request), &config, request, today).await {
        Ok(points) if !points.is_empty() => {
            log::debug!("{}: served by primary RPC {}", config.name, config.rpc_name);
            let series = build_series(points, request.period_type, config.campus_total_policy);
            return Ok(FetchOutcome {
                series,
                tier: Tier::PrimaryRpc,
            });
        }
        Ok(_) => log::warn!(
            "{}: primary RPC {} returned no usable rows, trying direct query",
            config.name,
            config.rpc_name
        ),
        Err(e) => log::warn!(
            "{}: primary RPC {} failed ({e}), trying direct query",
            config.name,
            config.rpc_name
        ),
    }

    match attempt(
        gateway,
        &query_call(&config, request, today),
        &config,
        request,
        today,
    )
    .await
    {
        Ok(points) if !points.is_empty() => {
            log::debug!("{}: served by fallback query", config.name);
            let series = build_series(points, request.period_type, config.campus_total_policy);
            return Ok(FetchOutcome {
                series,
                tier: Tier::FallbackQuery,
            });
        }
        Ok(_) => log::warn!(
            "{}: fallback query returned no usable rows, synthesizing",
            config.name
        ),
        Err(e) => log::warn!("{}: fallback query failed ({e}), synthesizing", config.name),
    }

    let series = synth::synthesize(kind, request, today)?;
    log::info!(
        "{}: serving synthetic placeholder data ({} periods)",
        config.name,
        series.periods.len()
    );
    Ok(FetchOutcome {
        series,
        tier: Tier::Synthetic,
    })
}

/// Invoke one tier and normalize its rows, applying the campus filter and
/// lookback floor client-side so every backend is held to the same window.
async fn attempt(
    gateway: &dyn Gateway,
    call: &GatewayCall,
    config: &MetricConfig,
    request: &RetrievalRequest,
    today: NaiveDate,
) -> Result<Vec<MetricPoint>> {
    let rows = gateway.invoke(call).await.into_rows()?;
    let mut points = normalize_rows(&rows, request.period_type, config.value_accessor);

    let floor = request
        .period_type
        .lookback_floor(today, request.lookback_units);
    points.retain(|p| p.period_date >= floor);
    if let Some(campus) = request.campus_filter.as_deref() {
        points.retain(|p| p.campus_name == campus);
    }
    Ok(points)
}

fn rpc_call(config: &MetricConfig, request: &RetrievalRequest) -> GatewayCall {
    let mut params: BTreeMap<String, Value> = BTreeMap::new();
    params.insert(
        "period_type".into(),
        json!(request.period_type.interval_unit()),
    );
    params.insert("lookback_units".into(), json!(request.lookback_units));
    params.insert(
        "campus_filter".into(),
        request
            .campus_filter
            .as_deref()
            .map(|c| json!(c))
            .unwrap_or(Value::Null),
    );
    GatewayCall::rpc(config.rpc_name, params)
}

fn query_call(config: &MetricConfig, request: &RetrievalRequest, today: NaiveDate) -> GatewayCall {
    let unit = request.period_type.interval_unit();
    let floor = request
        .period_type
        .lookback_floor(today, request.lookback_units);
    let campus_clause = match request.campus_filter.as_deref() {
        Some(campus) => format!(" AND campus_name = '{}'", campus.replace('\'', "''")),
        None => String::new(),
    };
    GatewayCall::query(format!(
        "SELECT date_trunc('{unit}', {date_col})::date AS period_date, campus_name, \
         {value_expr} AS {value_field} FROM {table} WHERE {date_col} >= '{floor}'{campus_clause} \
         GROUP BY 1, 2 ORDER BY 1 DESC",
        date_col = config.date_column,
        value_expr = config.value_expr,
        value_field = config.value_field,
        table = config.table,
    ))
}
