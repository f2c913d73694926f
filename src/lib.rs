//! Time-series metrics engine for an admissions pipeline dashboard.
//!
//! Raw period/campus-bucketed counts are retrieved through a pluggable
//! [`gateway::Gateway`], normalized into canonical [`metrics::MetricPoint`]s,
//! aggregated into a [`metrics::MetricSeries`] with period-over-period
//! deltas, and served through a per-metric façade with a three-tier
//! degradation policy (primary RPC, direct query, deterministic synthesis)
//! so a display-only metric never surfaces a hard backend error.

pub mod error;
pub mod fetch;
pub mod gateway;
pub mod metrics;
pub mod normalize;
pub mod period;

pub use error::{Error, Result};
pub use fetch::{
    FetchOutcome, MetricHandle, MetricKind, MetricState, MetricsClient, RetrievalRequest, Tier,
};
pub use gateway::{FixtureGateway, Gateway, GatewayCall, GatewayError, GatewayResponse};
pub use metrics::{
    build_series, compute_changes, CampusTotalPolicy, MetricPoint, MetricSeries, SeriesChanges,
    TimeSeriesEntry, ALL_CAMPUSES, NO_CAMPUS_MATCH,
};
pub use period::PeriodType;
