//! Core domain types: jobs, instruments, accounts, positions, and the
//! transient portfolio snapshot built from them (spec §3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        JobId(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(JobId(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job kind. `Rebalance` is a reserved extension point (spec's Open
/// Questions): accepted by the state machine but no worker set is wired for
/// it, so `handle` fails it immediately with `ErrorKind::Permanent` rather
/// than silently running it through the portfolio-analysis worker set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    PortfolioAnalysis,
    Rebalance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub cause: String,
}

/// The structured request payload captured at job creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub retirement_horizon_years: u32,
    pub annual_income_target: f64,
    pub risk_profile: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativePayload {
    pub text: String,
    pub quality_score: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Pie,
    Donut,
    Bar,
    HorizontalBar,
    Line,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartSpec {
    pub title: String,
    pub chart_type: ChartType,
    pub data: Vec<(String, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartsPayload {
    pub charts: Vec<ChartSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub label: String,
    pub year: u32,
    pub projected_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionsPayload {
    pub success_probability: f64,
    pub milestones: Vec<Milestone>,
    pub narrative: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryPayload {
    pub total_value: f64,
    pub headline: String,
}

/// A durable record of one analysis request and its outcome (spec §3).
///
/// Invariants enforced by the `Store` and the state machine, not re-checked
/// here:
///   - `status == Completed` implies all four payloads are `Some`.
///   - `status == Failed` implies `error.is_some()`.
///   - `started_at <= completed_at` when both are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner: UserId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub input: AnalysisRequest,
    pub narrative: Option<NarrativePayload>,
    pub charts: Option<ChartsPayload>,
    pub projections: Option<ProjectionsPayload>,
    pub summary: Option<SummaryPayload>,
    pub error: Option<ErrorDetail>,
    pub delivery_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn all_payloads_present(&self) -> bool {
        self.narrative.is_some()
            && self.charts.is_some()
            && self.projections.is_some()
            && self.summary.is_some()
    }
}

/// An allocation map (asset-class, region, or sector breakdown). Either
/// empty (unclassified) or sums to 100 within a tolerance of 0.01 — this is
/// the one place that invariant is checked; every caller goes through it
/// rather than re-deriving the tolerance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationMap(pub HashMap<String, f64>);

const ALLOCATION_TOLERANCE: f64 = 0.01;

impl AllocationMap {
    pub fn new(map: HashMap<String, f64>) -> Self {
        AllocationMap(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    /// True iff empty (unclassified) or sums to 100±0.01.
    pub fn is_valid(&self) -> bool {
        self.0.is_empty() || (self.sum() - 100.0).abs() <= ALLOCATION_TOLERANCE
    }

    pub fn weight_of(&self, key: &str) -> f64 {
        self.0.get(key).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub display_name: String,
    pub kind_hint: String,
    pub current_price: Option<f64>,
    pub asset_class_map: AllocationMap,
    pub region_map: AllocationMap,
    pub sector_map: AllocationMap,
}

impl Instrument {
    pub fn is_classified(&self) -> bool {
        !self.asset_class_map.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub owner: UserId,
    pub cash_balance: f64,
    pub cash_yield_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub account_id: Uuid,
    pub symbol: String,
    pub quantity: f64,
    pub as_of: DateTime<Utc>,
}

/// The bucket unclassified positions are folded into by the snapshot
/// builder (spec §4.1: "positions without allocation maps are treated as
/// asset-class 'other'").
pub const UNCLASSIFIED_BUCKET: &str = "other";

/// A portfolio's holdings, read consistently from the store at the start of
/// a dispatch, passed to workers by value. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PortfolioSnapshot {
    pub total_value: f64,
    pub cash_value: f64,
    pub asset_class_weights: HashMap<String, f64>,
    pub region_weights: HashMap<String, f64>,
    pub sector_weights: HashMap<String, f64>,
    pub position_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_map_empty_is_valid() {
        assert!(AllocationMap::default().is_valid());
    }

    #[test]
    fn allocation_map_within_tolerance_is_valid() {
        let mut m = HashMap::new();
        m.insert("equity".to_string(), 60.005);
        m.insert("fixed_income".to_string(), 39.995);
        assert!(AllocationMap::new(m).is_valid());
    }

    #[test]
    fn allocation_map_out_of_tolerance_is_invalid() {
        let mut m = HashMap::new();
        m.insert("equity".to_string(), 60.0);
        m.insert("fixed_income".to_string(), 30.0);
        assert!(!AllocationMap::new(m).is_valid());
    }

    #[test]
    fn job_status_round_trips_through_display_and_from_str() {
        for s in [JobStatus::Pending, JobStatus::Running, JobStatus::Completed, JobStatus::Failed] {
            let parsed: JobStatus = s.to_string().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }

    #[test]
    fn job_status_is_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }
}
