//! Worker invocation contracts (spec §6): typed request/response shapes for
//! the four specialist workers plus the Quality Judge. These are the only
//! shapes that cross the dispatcher/adapter boundary — dynamic JSON never
//! leaks past an adapter.

use serde::{Deserialize, Serialize};

use crate::domain::PortfolioSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierItemRequest {
    pub symbol: String,
    pub display_name: String,
    pub kind_hint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierRequest {
    pub items: Vec<ClassifierItemRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierItemResponse {
    pub symbol: String,
    pub asset_class_map: std::collections::HashMap<String, f64>,
    pub region_map: std::collections::HashMap<String, f64>,
    pub sector_map: std::collections::HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClassifierResponse {
    pub items: Vec<ClassifierItemResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub risk_profile: Option<String>,
    /// Opaque read-only context pulled from embedding/semantic search — the
    /// Narrator treats it as untrusted free text (spec §1: consumed
    /// opaquely as a read-only context source).
    pub context_notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarratorRequest {
    pub snapshot: PortfolioSnapshot,
    pub profile: UserProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarratorResponse {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityJudgeRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityJudgeResponse {
    pub score: u8,
    pub rationale: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizerRequest {
    pub snapshot: PortfolioSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawChartSpec {
    pub title: String,
    pub chart_type: String,
    pub data: Vec<(String, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VisualizerResponse {
    pub charts: Vec<RawChartSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectorRequest {
    pub snapshot: PortfolioSnapshot,
    pub retirement_horizon_years: u32,
    pub annual_income_target: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMilestone {
    pub label: String,
    pub year: u32,
    pub projected_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectorResponse {
    pub success_probability: f64,
    pub milestones: Vec<RawMilestone>,
    pub narrative: String,
}
