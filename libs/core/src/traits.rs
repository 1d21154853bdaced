//! Trait seams between the orchestrator and its collaborators (spec §4.5,
//! §6): the durable store, the work queue, the market data oracle, and the
//! five worker adapters. Concrete implementations live in `infrastructure`;
//! everything here is `#[async_trait]` so adapters and test fakes can both
//! implement it as trait objects behind `Arc<dyn _>`.

use async_trait::async_trait;
use uuid::Uuid;

use crate::contracts::{
    ClassifierRequest, ClassifierResponse, NarratorRequest, NarratorResponse, ProjectorRequest,
    ProjectorResponse, QualityJudgeRequest, QualityJudgeResponse, VisualizerRequest,
    VisualizerResponse,
};
use crate::domain::{
    Account, ChartsPayload, ErrorDetail, Instrument, Job, JobId, JobStatus, NarrativePayload,
    PortfolioSnapshot, Position, ProjectionsPayload, SummaryPayload, UserId,
};
use crate::error::PlannerError;

/// Durable storage for jobs, instruments, accounts and positions (spec
/// §4.5). A single implementation (SQLite) backs this in `infrastructure`;
/// orchestrator logic only ever depends on this trait.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_job(&self, id: JobId) -> Result<Job, PlannerError>;

    async fn insert_job(&self, job: &Job) -> Result<(), PlannerError>;

    async fn set_job_status(&self, id: JobId, status: JobStatus) -> Result<(), PlannerError>;

    async fn write_job_payload(&self, id: JobId, payload: JobPayload) -> Result<(), PlannerError>;

    async fn fail_job(&self, id: JobId, error: ErrorDetail) -> Result<(), PlannerError>;

    async fn get_portfolio(&self, owner: UserId) -> Result<PortfolioSnapshot, PlannerError>;

    async fn list_accounts(&self, owner: UserId) -> Result<Vec<Account>, PlannerError>;

    async fn list_positions(&self, account_id: Uuid) -> Result<Vec<Position>, PlannerError>;

    async fn get_instruments(&self, symbols: &[String]) -> Result<Vec<Instrument>, PlannerError>;

    async fn upsert_instruments(&self, instruments: &[Instrument]) -> Result<(), PlannerError>;
}

/// One of the four worker payload slots a job accumulates (spec §3's
/// `Job.narrative/.charts/.projections/.summary`). Isolated here so `Store`
/// exposes a single narrow write method instead of four near-identical ones.
#[derive(Debug, Clone)]
pub enum JobPayload {
    Narrative(NarrativePayload),
    Charts(ChartsPayload),
    Projections(ProjectionsPayload),
    Summary(SummaryPayload),
}

/// The work queue a job is dequeued from and redelivered through on
/// failure (spec §4.4, §7). Redelivery-count bookkeeping and poison-message
/// detection live behind this trait, mirroring the durable-queue pattern
/// the store itself follows for jobs.
#[async_trait]
pub trait Queue: Send + Sync {
    async fn enqueue(&self, job_id: JobId) -> Result<(), PlannerError>;

    /// Claims the oldest pending message, marking it in-flight. Returns
    /// `None` when the queue is empty.
    async fn dequeue(&self) -> Result<Option<QueueMessage>, PlannerError>;

    async fn ack(&self, job_id: JobId) -> Result<(), PlannerError>;

    /// Releases the message back to `Pending` for redelivery, incrementing
    /// its attempt counter.
    async fn nack(&self, job_id: JobId) -> Result<(), PlannerError>;

    /// Records a liveness pulse for an in-flight message so zombie reclaim
    /// doesn't treat it as abandoned mid-processing.
    async fn heartbeat(&self, job_id: JobId) -> Result<(), PlannerError>;

    /// Releases in-flight messages whose last heartbeat is older than
    /// `stale_after_minutes` back to `Pending` for redelivery.
    async fn reclaim_stale(&self, stale_after_minutes: i64) -> Result<u64, PlannerError>;
}

#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub job_id: JobId,
    pub delivery_attempts: u32,
}

/// External market-data lookup (spec §4.2's price-refresh step).
#[async_trait]
pub trait MarketOracle: Send + Sync {
    async fn current_prices(&self, symbols: &[String]) -> Result<Vec<(String, f64)>, PlannerError>;
}

/// Fills in asset-class/region/sector maps for instruments the store has no
/// classification for yet (spec §4.2).
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, request: ClassifierRequest) -> Result<ClassifierResponse, PlannerError>;
}

/// Produces the free-text portfolio narrative (spec §6).
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(&self, request: NarratorRequest) -> Result<NarratorResponse, PlannerError>;
}

/// Scores a Narrator draft; consulted by the dispatcher's quality gate
/// before a narrative is accepted (spec §4.3, §6).
#[async_trait]
pub trait QualityJudge: Send + Sync {
    async fn judge(&self, request: QualityJudgeRequest) -> Result<QualityJudgeResponse, PlannerError>;
}

/// Produces chart specifications from a portfolio snapshot (spec §6).
#[async_trait]
pub trait Visualizer: Send + Sync {
    async fn visualize(&self, request: VisualizerRequest) -> Result<VisualizerResponse, PlannerError>;
}

/// Produces a retirement projection and milestone schedule (spec §6).
#[async_trait]
pub trait Projector: Send + Sync {
    async fn project(&self, request: ProjectorRequest) -> Result<ProjectorResponse, PlannerError>;
}
