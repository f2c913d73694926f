pub mod fallback;
pub mod synth;

pub use fallback::{fetch_with_fallback, FetchOutcome, Tier};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::error::{Error, Result};
use crate::gateway::Gateway;
use crate::metrics::{CampusTotalPolicy, MetricSeries};
use crate::normalize::{RawRow, ValueAccessor};
use crate::period::PeriodType;

/// Input contract for one metric fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalRequest {
    pub period_type: PeriodType,
    pub lookback_units: u32,
    /// `None` means all campuses.
    pub campus_filter: Option<String>,
    pub enabled: bool,
    /// Opaque; increment to force a fresh fetch cycle.
    pub refetch_token: u64,
}

impl Default for RetrievalRequest {
    fn default() -> Self {
        Self {
            period_type: PeriodType::Week,
            lookback_units: 12,
            campus_filter: None,
            enabled: true,
            refetch_token: 0,
        }
    }
}

impl RetrievalRequest {
    pub fn validate(&self) -> Result<()> {
        if self.lookback_units == 0 {
            return Err(Error::Request("lookback_units must be positive".into()));
        }
        if matches!(self.campus_filter.as_deref(), Some(s) if s.trim().is_empty()) {
            return Err(Error::Request("campus_filter must not be blank".into()));
        }
        Ok(())
    }
}

/// One metric family shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    LeadsCreated,
    LeadsConverted,
    OpportunitiesByStage,
    ClosedWon,
    Arr,
    CumulativeArr,
    GradeBandEnrollment,
    TotalEnrolled,
}

/// Static configuration that makes each metric family a thin record over
/// the shared pipeline instead of a bespoke implementation.
#[derive(Debug, Clone, Copy)]
pub struct MetricConfig {
    pub name: &'static str,
    /// Tier-1 remote procedure.
    pub rpc_name: &'static str,
    /// Tier-2 raw-query surface.
    pub table: &'static str,
    pub date_column: &'static str,
    /// Aggregate expression for the tier-2 query.
    pub value_expr: &'static str,
    pub value_field: &'static str,
    pub value_accessor: ValueAccessor,
    pub campus_total_policy: CampusTotalPolicy,
    /// Typical per-campus, per-period magnitude for synthesis.
    pub base_magnitude: f64,
}

fn lead_count(row: &RawRow) -> Option<&Value> {
    row.get("lead_count")
}

fn opportunity_count(row: &RawRow) -> Option<&Value> {
    row.get("opportunity_count")
}

fn arr_amount(row: &RawRow) -> Option<&Value> {
    row.get("arr_amount")
}

fn cumulative_arr(row: &RawRow) -> Option<&Value> {
    row.get("cumulative_arr")
}

fn student_count(row: &RawRow) -> Option<&Value> {
    row.get("student_count")
}

impl MetricKind {
    pub fn all() -> [MetricKind; 8] {
        [
            MetricKind::LeadsCreated,
            MetricKind::LeadsConverted,
            MetricKind::OpportunitiesByStage,
            MetricKind::ClosedWon,
            MetricKind::Arr,
            MetricKind::CumulativeArr,
            MetricKind::GradeBandEnrollment,
            MetricKind::TotalEnrolled,
        ]
    }

    /// Parse a CLI-style metric name, e.g. `leads-created`.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "leads-created" => Ok(MetricKind::LeadsCreated),
            "leads-converted" => Ok(MetricKind::LeadsConverted),
            "opportunities-by-stage" | "opportunities" => Ok(MetricKind::OpportunitiesByStage),
            "closed-won" => Ok(MetricKind::ClosedWon),
            "arr" => Ok(MetricKind::Arr),
            "cumulative-arr" => Ok(MetricKind::CumulativeArr),
            "grade-band-enrollment" => Ok(MetricKind::GradeBandEnrollment),
            "total-enrolled" => Ok(MetricKind::TotalEnrolled),
            other => Err(Error::Request(format!("unknown metric: {other}"))),
        }
    }

    pub fn config(&self) -> MetricConfig {
        match self {
            MetricKind::LeadsCreated => MetricConfig {
                name: "leads_created",
                rpc_name: "leads_created_by_period",
                table: "leads",
                date_column: "created_at",
                value_expr: "COUNT(*)",
                value_field: "lead_count",
                value_accessor: lead_count,
                campus_total_policy: CampusTotalPolicy::Sum,
                base_magnitude: 40.0,
            },
            MetricKind::LeadsConverted => MetricConfig {
                name: "leads_converted",
                rpc_name: "leads_converted_by_period",
                table: "leads",
                date_column: "converted_at",
                value_expr: "COUNT(*)",
                value_field: "lead_count",
                value_accessor: lead_count,
                campus_total_policy: CampusTotalPolicy::Sum,
                base_magnitude: 15.0,
            },
            MetricKind::OpportunitiesByStage => MetricConfig {
                name: "opportunities_by_stage",
                rpc_name: "opportunities_by_stage_period",
                table: "opportunities",
                date_column: "stage_entered_at",
                value_expr: "COUNT(*)",
                value_field: "opportunity_count",
                value_accessor: opportunity_count,
                campus_total_policy: CampusTotalPolicy::Sum,
                base_magnitude: 25.0,
            },
            MetricKind::ClosedWon => MetricConfig {
                name: "closed_won",
                rpc_name: "closed_won_by_period",
                table: "opportunities",
                date_column: "closed_at",
                value_expr: "COUNT(*)",
                value_field: "opportunity_count",
                value_accessor: opportunity_count,
                campus_total_policy: CampusTotalPolicy::Sum,
                base_magnitude: 8.0,
            },
            MetricKind::Arr => MetricConfig {
                name: "arr",
                rpc_name: "arr_by_period",
                table: "opportunities",
                date_column: "closed_at",
                value_expr: "SUM(arr_amount)",
                value_field: "arr_amount",
                value_accessor: arr_amount,
                campus_total_policy: CampusTotalPolicy::Sum,
                base_magnitude: 90_000.0,
            },
            MetricKind::CumulativeArr => MetricConfig {
                name: "cumulative_arr",
                rpc_name: "cumulative_arr_by_period",
                table: "opportunities",
                date_column: "closed_at",
                value_expr: "SUM(arr_amount) OVER (ORDER BY 1)",
                value_field: "cumulative_arr",
                value_accessor: cumulative_arr,
                campus_total_policy: CampusTotalPolicy::Latest,
                base_magnitude: 750_000.0,
            },
            MetricKind::GradeBandEnrollment => MetricConfig {
                name: "grade_band_enrollment",
                rpc_name: "grade_band_enrollment_by_period",
                table: "enrollments",
                date_column: "effective_date",
                value_expr: "COUNT(*)",
                value_field: "student_count",
                value_accessor: student_count,
                campus_total_policy: CampusTotalPolicy::Latest,
                base_magnitude: 120.0,
            },
            MetricKind::TotalEnrolled => MetricConfig {
                name: "total_enrolled",
                rpc_name: "total_enrolled_by_period",
                table: "enrollments",
                date_column: "effective_date",
                value_expr: "COUNT(*)",
                value_field: "student_count",
                value_accessor: student_count,
                campus_total_policy: CampusTotalPolicy::Latest,
                base_magnitude: 450.0,
            },
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.config().name)
    }
}

/// The committed snapshot a consumer renders from.
#[derive(Debug, Clone, Default)]
pub struct MetricState {
    pub loading: bool,
    pub data: Option<MetricSeries>,
    pub error: Option<Error>,
    /// Which tier actually served the data, for diagnosis.
    pub served_by: Option<Tier>,
}

struct HandleInner {
    state: MetricState,
    last_request: Option<RetrievalRequest>,
}

/// Per-metric fetch binding: runs the fallback pipeline and commits the
/// result, discarding responses that belong to a superseded request.
///
/// Cancellation is cooperative only — an abandoned cycle's gateway call is
/// not aborted, its eventual result is just never committed (the
/// generation counter detects staleness).
pub struct MetricHandle {
    gateway: Arc<dyn Gateway>,
    kind: MetricKind,
    generation: AtomicU64,
    inner: Mutex<HandleInner>,
}

impl MetricHandle {
    pub fn new(gateway: Arc<dyn Gateway>, kind: MetricKind) -> Self {
        Self {
            gateway,
            kind,
            generation: AtomicU64::new(0),
            inner: Mutex::new(HandleInner {
                state: MetricState::default(),
                last_request: None,
            }),
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Current committed snapshot.
    pub fn state(&self) -> MetricState {
        self.inner.lock().expect("handle lock poisoned").state.clone()
    }

    /// Run a fetch cycle for `request` and commit the result, unless a
    /// newer cycle started in the meantime.
    pub async fn fetch(&self, request: RetrievalRequest) -> MetricState {
        if !request.enabled {
            // The disabled request is the newest cycle: advance the
            // generation so any enabled cycle still in flight is stale and
            // cannot commit over the cleared state.
            self.generation.fetch_add(1, Ordering::SeqCst);
            let mut inner = self.inner.lock().expect("handle lock poisoned");
            inner.state = MetricState::default();
            inner.last_request = Some(request);
            return inner.state.clone();
        }

        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut inner = self.inner.lock().expect("handle lock poisoned");
            inner.state.loading = true;
            inner.last_request = Some(request.clone());
        }

        let today = chrono::Local::now().date_naive();
        let result =
            fetch_with_fallback(self.gateway.as_ref(), self.kind, &request, today).await;

        let mut inner = self.inner.lock().expect("handle lock poisoned");
        if self.generation.load(Ordering::SeqCst) != my_generation {
            log::debug!(
                "{}: discarding stale response for superseded request (generation {my_generation})",
                self.kind
            );
            return inner.state.clone();
        }

        inner.state = match result {
            Ok(outcome) => MetricState {
                loading: false,
                data: Some(outcome.series),
                error: None,
                served_by: Some(outcome.tier),
            },
            Err(e) => MetricState {
                loading: false,
                data: None,
                error: Some(e),
                served_by: None,
            },
        };
        inner.state.clone()
    }

    /// Fetch only if the request differs from the last committed one (a
    /// changed `refetch_token` counts as different) or no data exists yet.
    pub async fn ensure(&self, request: RetrievalRequest) -> MetricState {
        {
            let inner = self.inner.lock().expect("handle lock poisoned");
            if inner.last_request.as_ref() == Some(&request) && inner.state.data.is_some() {
                return inner.state.clone();
            }
        }
        self.fetch(request).await
    }
}

/// Entry point binding a gateway to the metric families.
pub struct MetricsClient {
    gateway: Arc<dyn Gateway>,
}

impl MetricsClient {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// A stateful per-metric binding with stale-response suppression.
    pub fn handle(&self, kind: MetricKind) -> MetricHandle {
        MetricHandle::new(self.gateway.clone(), kind)
    }

    /// One-shot fetch with no committed state (CLI and tests).
    pub async fn fetch(&self, kind: MetricKind, request: &RetrievalRequest) -> Result<FetchOutcome> {
        let today = chrono::Local::now().date_naive();
        fetch_with_fallback(self.gateway.as_ref(), kind, request, today).await
    }
}
