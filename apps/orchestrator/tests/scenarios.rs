//! End-to-end scenarios against fakes for every collaborator trait: happy
//! path, a classification gap, a low-quality narrative that regenerates, a
//! transient-then-success projector, a required worker's permanent
//! failure, a poison message, a worker stuck returning malformed output,
//! an unconditionally-accepted regeneration, and a job-level timeout
//! racing an in-flight worker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use orchestrator::orchestrator::Orchestrator;
use planner_core::contracts::{
    ClassifierItemResponse, ClassifierRequest, ClassifierResponse, NarratorRequest, NarratorResponse,
    ProjectorRequest, ProjectorResponse, QualityJudgeRequest, QualityJudgeResponse, RawChartSpec,
    RawMilestone, VisualizerRequest, VisualizerResponse,
};
use planner_core::domain::{
    Account, AllocationMap, AnalysisRequest, ErrorDetail, Instrument, Job, JobId, JobKind, JobStatus,
    PortfolioSnapshot, Position, UserId,
};
use planner_core::error::PlannerError;
use planner_core::events::{Event, EventSink, Outcome, Worker};
use planner_core::traits::{Classifier, JobPayload, MarketOracle, Narrator, Projector, QualityJudge, Store, Visualizer};
use shared::config::PlannerConfig;
use uuid::Uuid;

#[derive(Default)]
struct FakeStore {
    jobs: Mutex<HashMap<JobId, Job>>,
    accounts: Mutex<HashMap<UserId, Vec<Account>>>,
    positions: Mutex<HashMap<Uuid, Vec<Position>>>,
    instruments: Mutex<HashMap<String, Instrument>>,
}

#[async_trait]
impl Store for FakeStore {
    async fn get_job(&self, id: JobId) -> Result<Job, PlannerError> {
        self.jobs
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| PlannerError::NotFound { job_id: id.to_string() })
    }

    async fn insert_job(&self, job: &Job) -> Result<(), PlannerError> {
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(())
    }

    async fn set_job_status(&self, id: JobId, status: JobStatus) -> Result<(), PlannerError> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(&id) {
            if !job.status.is_terminal() {
                job.status = status;
            }
        }
        Ok(())
    }

    async fn write_job_payload(&self, id: JobId, payload: JobPayload) -> Result<(), PlannerError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&id).unwrap();
        match payload {
            JobPayload::Narrative(p) => job.narrative = Some(p),
            JobPayload::Charts(p) => job.charts = Some(p),
            JobPayload::Projections(p) => job.projections = Some(p),
            JobPayload::Summary(p) => job.summary = Some(p),
        }
        Ok(())
    }

    async fn fail_job(&self, id: JobId, error: ErrorDetail) -> Result<(), PlannerError> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(&id) {
            if !job.status.is_terminal() {
                job.status = JobStatus::Failed;
                job.error = Some(error);
            }
        }
        Ok(())
    }

    async fn get_portfolio(&self, _owner: UserId) -> Result<PortfolioSnapshot, PlannerError> {
        Ok(PortfolioSnapshot::default())
    }

    async fn list_accounts(&self, owner: UserId) -> Result<Vec<Account>, PlannerError> {
        Ok(self.accounts.lock().unwrap().get(&owner).cloned().unwrap_or_default())
    }

    async fn list_positions(&self, account_id: Uuid) -> Result<Vec<Position>, PlannerError> {
        Ok(self.positions.lock().unwrap().get(&account_id).cloned().unwrap_or_default())
    }

    async fn get_instruments(&self, symbols: &[String]) -> Result<Vec<Instrument>, PlannerError> {
        let instruments = self.instruments.lock().unwrap();
        Ok(symbols.iter().filter_map(|s| instruments.get(s).cloned()).collect())
    }

    async fn upsert_instruments(&self, instruments: &[Instrument]) -> Result<(), PlannerError> {
        let mut store = self.instruments.lock().unwrap();
        for instrument in instruments {
            store.insert(instrument.symbol.clone(), instrument.clone());
        }
        Ok(())
    }
}

struct FakeOracle;

#[async_trait]
impl MarketOracle for FakeOracle {
    async fn current_prices(&self, symbols: &[String]) -> Result<Vec<(String, f64)>, PlannerError> {
        Ok(symbols.iter().map(|s| (s.clone(), 100.0)).collect())
    }
}

struct FakeClassifier;

#[async_trait]
impl Classifier for FakeClassifier {
    async fn classify(&self, request: ClassifierRequest) -> Result<ClassifierResponse, PlannerError> {
        Ok(ClassifierResponse {
            items: request
                .items
                .into_iter()
                .map(|item| ClassifierItemResponse {
                    symbol: item.symbol,
                    asset_class_map: HashMap::from([("equity".to_string(), 100.0)]),
                    region_map: HashMap::from([("us".to_string(), 100.0)]),
                    sector_map: HashMap::from([("tech".to_string(), 100.0)]),
                })
                .collect(),
        })
    }
}

struct FakeNarrator {
    texts: Vec<&'static str>,
    call_count: AtomicU32,
}

impl FakeNarrator {
    fn single(text: &'static str) -> Self {
        Self { texts: vec![text], call_count: AtomicU32::new(0) }
    }

    fn sequence(texts: Vec<&'static str>) -> Self {
        Self { texts, call_count: AtomicU32::new(0) }
    }
}

const GOOD_NARRATIVE: &str = "Executive Summary\nAll good.\nRisks\nNone major.\nRecommendations\nStay the course.";

#[async_trait]
impl Narrator for FakeNarrator {
    async fn narrate(&self, _request: NarratorRequest) -> Result<NarratorResponse, PlannerError> {
        let idx = self.call_count.fetch_add(1, Ordering::SeqCst) as usize;
        let text = self.texts.get(idx).or_else(|| self.texts.last()).unwrap();
        Ok(NarratorResponse { text: text.to_string() })
    }
}

/// Always returns narrative text missing a required heading, so every
/// attempt is rejected with `ErrorKind::Validation`.
struct MalformedNarrator {
    call_count: AtomicU32,
}

impl MalformedNarrator {
    fn new() -> Self {
        Self { call_count: AtomicU32::new(0) }
    }
}

#[async_trait]
impl Narrator for MalformedNarrator {
    async fn narrate(&self, _request: NarratorRequest) -> Result<NarratorResponse, PlannerError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Ok(NarratorResponse { text: "Executive Summary\nAll good.".to_string() })
    }
}

/// Never resolves on its own; used to exercise job-level timeout
/// cancellation, which is expected to win the race against this future.
struct HangingNarrator;

#[async_trait]
impl Narrator for HangingNarrator {
    async fn narrate(&self, _request: NarratorRequest) -> Result<NarratorResponse, PlannerError> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Ok(NarratorResponse { text: GOOD_NARRATIVE.to_string() })
    }
}

struct FakeJudge {
    scores: Vec<u8>,
    call_count: AtomicU32,
}

impl FakeJudge {
    fn always(score: u8) -> Self {
        Self { scores: vec![score], call_count: AtomicU32::new(0) }
    }

    fn sequence(scores: Vec<u8>) -> Self {
        Self { scores, call_count: AtomicU32::new(0) }
    }
}

#[async_trait]
impl QualityJudge for FakeJudge {
    async fn judge(&self, _request: QualityJudgeRequest) -> Result<QualityJudgeResponse, PlannerError> {
        let idx = self.call_count.fetch_add(1, Ordering::SeqCst) as usize;
        let score = *self.scores.get(idx).unwrap_or(self.scores.last().unwrap());
        Ok(QualityJudgeResponse { score, rationale: "fake".to_string() })
    }
}

struct FakeVisualizer {
    fail_permanently: bool,
}

#[async_trait]
impl Visualizer for FakeVisualizer {
    async fn visualize(&self, _request: VisualizerRequest) -> Result<VisualizerResponse, PlannerError> {
        if self.fail_permanently {
            return Err(PlannerError::permanent("visualizer quota exhausted"));
        }
        Ok(VisualizerResponse {
            charts: vec![
                RawChartSpec { title: "Asset Class".into(), chart_type: "pie".into(), data: vec![] },
                RawChartSpec { title: "Region".into(), chart_type: "bar".into(), data: vec![] },
                RawChartSpec { title: "Sector".into(), chart_type: "donut".into(), data: vec![] },
                RawChartSpec { title: "Trend".into(), chart_type: "line".into(), data: vec![] },
            ],
        })
    }
}

struct FakeProjector {
    transient_failures: u32,
    call_count: AtomicU32,
}

impl FakeProjector {
    fn always_succeeds() -> Self {
        Self { transient_failures: 0, call_count: AtomicU32::new(0) }
    }

    fn fails_then_succeeds(n: u32) -> Self {
        Self { transient_failures: n, call_count: AtomicU32::new(0) }
    }
}

#[async_trait]
impl Projector for FakeProjector {
    async fn project(&self, _request: ProjectorRequest) -> Result<ProjectorResponse, PlannerError> {
        let attempt = self.call_count.fetch_add(1, Ordering::SeqCst);
        if attempt < self.transient_failures {
            return Err(PlannerError::transient("oracle momentarily unavailable"));
        }
        Ok(ProjectorResponse {
            success_probability: 0.8,
            milestones: vec![RawMilestone { label: "Age 65".into(), year: 2045, projected_value: 1_000_000.0 }],
            narrative: "On track".to_string(),
        })
    }
}

#[derive(Default)]
struct RecordingEventSink {
    events: Mutex<Vec<Event>>,
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

fn test_config() -> PlannerConfig {
    PlannerConfig {
        job_timeout_ms: 5_000,
        worker_timeout_ms: 2_000,
        worker_max_attempts: 3,
        backoff_base_ms: 1,
        backoff_factor: 2.0,
        backoff_cap_ms: 5,
        backoff_jitter: 0.0,
        judge_threshold: 60,
        chart_count_min: 4,
        chart_count_max: 8,
        poison_attempt_threshold: 5,
        price_batch_size: 100,
        price_budget_ms: 20_000,
        narrator_required_headings: vec!["Executive Summary".into(), "Risks".into(), "Recommendations".into()],
        database_url: "sqlite::memory:".into(),
        market_oracle_url: "http://unused".into(),
        queue_poll_interval_ms: 10,
        zombie_reclaim_minutes: 5,
        gemini_api_key: String::new(),
    }
}

fn seed_job(store: &FakeStore, kind: JobKind) -> JobId {
    let owner = UserId(Uuid::new_v4());
    let account_id = Uuid::new_v4();

    store.accounts.lock().unwrap().insert(
        owner,
        vec![Account { id: account_id, owner, cash_balance: 1_000.0, cash_yield_rate: None }],
    );
    store.positions.lock().unwrap().insert(
        account_id,
        vec![Position { account_id, symbol: "ACME".to_string(), quantity: 10.0, as_of: Utc::now() }],
    );

    let job = Job {
        id: JobId::new(),
        owner,
        kind,
        status: JobStatus::Pending,
        input: AnalysisRequest { retirement_horizon_years: 20, annual_income_target: 60_000.0, risk_profile: None },
        narrative: None,
        charts: None,
        projections: None,
        summary: None,
        error: None,
        delivery_attempts: 0,
        created_at: Utc::now(),
        started_at: None,
        completed_at: None,
        updated_at: Utc::now(),
    };
    let id = job.id;
    store.jobs.lock().unwrap().insert(id, job);
    id
}

#[allow(clippy::too_many_arguments)]
fn orchestrator_with(
    store: Arc<FakeStore>,
    classifier: Arc<dyn Classifier>,
    narrator: Arc<dyn Narrator>,
    judge: Arc<dyn QualityJudge>,
    visualizer: Arc<dyn Visualizer>,
    projector: Arc<dyn Projector>,
    sink: Arc<RecordingEventSink>,
) -> Orchestrator {
    Orchestrator {
        store,
        oracle: Arc::new(FakeOracle),
        classifier,
        narrator,
        quality_judge: judge,
        visualizer,
        projector,
        sink,
        config: test_config(),
    }
}

#[allow(clippy::too_many_arguments)]
fn orchestrator_with_config(
    store: Arc<FakeStore>,
    classifier: Arc<dyn Classifier>,
    narrator: Arc<dyn Narrator>,
    judge: Arc<dyn QualityJudge>,
    visualizer: Arc<dyn Visualizer>,
    projector: Arc<dyn Projector>,
    sink: Arc<RecordingEventSink>,
    config: PlannerConfig,
) -> Orchestrator {
    Orchestrator {
        store,
        oracle: Arc::new(FakeOracle),
        classifier,
        narrator,
        quality_judge: judge,
        visualizer,
        projector,
        sink,
        config,
    }
}

#[tokio::test]
async fn scenario_1_happy_path_completes_with_all_payloads() {
    let store = Arc::new(FakeStore::default());
    store.instruments.lock().unwrap().insert(
        "ACME".to_string(),
        Instrument {
            symbol: "ACME".to_string(),
            display_name: "Acme".to_string(),
            kind_hint: "equity".to_string(),
            current_price: None,
            asset_class_map: AllocationMap::new(HashMap::from([("equity".to_string(), 100.0)])),
            region_map: AllocationMap::default(),
            sector_map: AllocationMap::default(),
        },
    );
    let job_id = seed_job(&store, JobKind::PortfolioAnalysis);
    let sink = Arc::new(RecordingEventSink::default());

    let orchestrator = orchestrator_with(
        store.clone(),
        Arc::new(FakeClassifier),
        Arc::new(FakeNarrator::single(GOOD_NARRATIVE)),
        Arc::new(FakeJudge::always(90)),
        Arc::new(FakeVisualizer { fail_permanently: false }),
        Arc::new(FakeProjector::always_succeeds()),
        sink.clone(),
    );

    orchestrator.handle(job_id, 1).await.unwrap();

    let job = store.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.all_payloads_present());
    assert!(sink.events.lock().unwrap().iter().any(|e| matches!(e, Event::JobTerminal { status: JobStatus::Completed, .. })));
}

#[tokio::test]
async fn scenario_2_classification_gap_is_filled_before_dispatch() {
    let store = Arc::new(FakeStore::default());
    let job_id = seed_job(&store, JobKind::PortfolioAnalysis);
    let sink = Arc::new(RecordingEventSink::default());

    let orchestrator = orchestrator_with(
        store.clone(),
        Arc::new(FakeClassifier),
        Arc::new(FakeNarrator::single(GOOD_NARRATIVE)),
        Arc::new(FakeJudge::always(90)),
        Arc::new(FakeVisualizer { fail_permanently: false }),
        Arc::new(FakeProjector::always_succeeds()),
        sink,
    );

    orchestrator.handle(job_id, 1).await.unwrap();

    let job = store.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let instrument = store.instruments.lock().unwrap().get("ACME").cloned().unwrap();
    assert!(instrument.is_classified());
}

#[tokio::test]
async fn scenario_3_low_quality_narrative_regenerates_once() {
    let store = Arc::new(FakeStore::default());
    store.instruments.lock().unwrap().insert(
        "ACME".to_string(),
        Instrument {
            symbol: "ACME".to_string(),
            display_name: "Acme".to_string(),
            kind_hint: "equity".to_string(),
            current_price: Some(10.0),
            asset_class_map: AllocationMap::new(HashMap::from([("equity".to_string(), 100.0)])),
            region_map: AllocationMap::default(),
            sector_map: AllocationMap::default(),
        },
    );
    let job_id = seed_job(&store, JobKind::PortfolioAnalysis);
    let sink = Arc::new(RecordingEventSink::default());

    const WEAK_NARRATIVE: &str = "Executive Summary\nMeh.\nRisks\nSome.\nRecommendations\nMaybe.";
    const STRONG_NARRATIVE: &str = "Executive Summary\nStrong.\nRisks\nModerate.\nRecommendations\nRebalance.";

    let orchestrator = orchestrator_with(
        store.clone(),
        Arc::new(FakeClassifier),
        Arc::new(FakeNarrator::sequence(vec![WEAK_NARRATIVE, STRONG_NARRATIVE])),
        Arc::new(FakeJudge::sequence(vec![40, 85])),
        Arc::new(FakeVisualizer { fail_permanently: false }),
        Arc::new(FakeProjector::always_succeeds()),
        sink,
    );

    orchestrator.handle(job_id, 1).await.unwrap();

    let job = store.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let narrative = job.narrative.unwrap();
    assert_eq!(narrative.text, STRONG_NARRATIVE);
    assert_eq!(narrative.quality_score, 85);
}

#[tokio::test]
async fn scenario_4_projector_recovers_from_transient_failure() {
    let store = Arc::new(FakeStore::default());
    store.instruments.lock().unwrap().insert(
        "ACME".to_string(),
        Instrument {
            symbol: "ACME".to_string(),
            display_name: "Acme".to_string(),
            kind_hint: "equity".to_string(),
            current_price: Some(10.0),
            asset_class_map: AllocationMap::new(HashMap::from([("equity".to_string(), 100.0)])),
            region_map: AllocationMap::default(),
            sector_map: AllocationMap::default(),
        },
    );
    let job_id = seed_job(&store, JobKind::PortfolioAnalysis);
    let sink = Arc::new(RecordingEventSink::default());

    let orchestrator = orchestrator_with(
        store.clone(),
        Arc::new(FakeClassifier),
        Arc::new(FakeNarrator::single(GOOD_NARRATIVE)),
        Arc::new(FakeJudge::always(90)),
        Arc::new(FakeVisualizer { fail_permanently: false }),
        Arc::new(FakeProjector::fails_then_succeeds(2)),
        sink,
    );

    orchestrator.handle(job_id, 1).await.unwrap();

    let job = store.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.projections.is_some());
}

#[tokio::test]
async fn scenario_5_required_worker_permanent_failure_fails_the_job() {
    let store = Arc::new(FakeStore::default());
    store.instruments.lock().unwrap().insert(
        "ACME".to_string(),
        Instrument {
            symbol: "ACME".to_string(),
            display_name: "Acme".to_string(),
            kind_hint: "equity".to_string(),
            current_price: Some(10.0),
            asset_class_map: AllocationMap::new(HashMap::from([("equity".to_string(), 100.0)])),
            region_map: AllocationMap::default(),
            sector_map: AllocationMap::default(),
        },
    );
    let job_id = seed_job(&store, JobKind::PortfolioAnalysis);
    let sink = Arc::new(RecordingEventSink::default());

    let orchestrator = orchestrator_with(
        store.clone(),
        Arc::new(FakeClassifier),
        Arc::new(FakeNarrator::single(GOOD_NARRATIVE)),
        Arc::new(FakeJudge::always(90)),
        Arc::new(FakeVisualizer { fail_permanently: true }),
        Arc::new(FakeProjector::always_succeeds()),
        sink,
    );

    orchestrator.handle(job_id, 1).await.unwrap();

    let job = store.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.unwrap().kind, planner_core::error::ErrorKind::Permanent);
}

#[tokio::test]
async fn scenario_6_poison_message_fails_without_running_workers() {
    let store = Arc::new(FakeStore::default());
    let job_id = seed_job(&store, JobKind::PortfolioAnalysis);
    let sink = Arc::new(RecordingEventSink::default());

    let orchestrator = orchestrator_with(
        store.clone(),
        Arc::new(FakeClassifier),
        Arc::new(FakeNarrator::single(GOOD_NARRATIVE)),
        Arc::new(FakeJudge::always(90)),
        Arc::new(FakeVisualizer { fail_permanently: false }),
        Arc::new(FakeProjector::always_succeeds()),
        sink,
    );

    orchestrator.handle(job_id, 6).await.unwrap();

    let job = store.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.unwrap().kind, planner_core::error::ErrorKind::Poison);
    assert!(job.narrative.is_none());
}

#[tokio::test]
async fn scenario_7_malformed_narrator_gets_exactly_one_extra_attempt() {
    let store = Arc::new(FakeStore::default());
    store.instruments.lock().unwrap().insert(
        "ACME".to_string(),
        Instrument {
            symbol: "ACME".to_string(),
            display_name: "Acme".to_string(),
            kind_hint: "equity".to_string(),
            current_price: Some(10.0),
            asset_class_map: AllocationMap::new(HashMap::from([("equity".to_string(), 100.0)])),
            region_map: AllocationMap::default(),
            sector_map: AllocationMap::default(),
        },
    );
    let job_id = seed_job(&store, JobKind::PortfolioAnalysis);
    let sink = Arc::new(RecordingEventSink::default());
    let narrator = Arc::new(MalformedNarrator::new());

    let orchestrator = orchestrator_with(
        store.clone(),
        Arc::new(FakeClassifier),
        narrator.clone(),
        Arc::new(FakeJudge::always(90)),
        Arc::new(FakeVisualizer { fail_permanently: false }),
        Arc::new(FakeProjector::always_succeeds()),
        sink.clone(),
    );

    orchestrator.handle(job_id, 1).await.unwrap();

    let job = store.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.unwrap().kind, planner_core::error::ErrorKind::Validation);
    assert_eq!(narrator.call_count.load(Ordering::SeqCst), 2, "validation cap is 1 retry, not worker_max_attempts");

    let events = sink.events.lock().unwrap();
    let narrator_results: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, Event::WorkerResult { worker: Worker::Narrator, .. }))
        .collect();
    assert_eq!(narrator_results.len(), 2);
    assert!(narrator_results
        .iter()
        .all(|e| matches!(e, Event::WorkerResult { outcome: Outcome::Validation, .. })));
}

#[tokio::test]
async fn scenario_8_regeneration_is_accepted_even_if_it_scores_lower() {
    let store = Arc::new(FakeStore::default());
    store.instruments.lock().unwrap().insert(
        "ACME".to_string(),
        Instrument {
            symbol: "ACME".to_string(),
            display_name: "Acme".to_string(),
            kind_hint: "equity".to_string(),
            current_price: Some(10.0),
            asset_class_map: AllocationMap::new(HashMap::from([("equity".to_string(), 100.0)])),
            region_map: AllocationMap::default(),
            sector_map: AllocationMap::default(),
        },
    );
    let job_id = seed_job(&store, JobKind::PortfolioAnalysis);
    let sink = Arc::new(RecordingEventSink::default());

    const WEAK_NARRATIVE: &str = "Executive Summary\nMeh.\nRisks\nSome.\nRecommendations\nMaybe.";
    const REGENERATED_NARRATIVE: &str = "Executive Summary\nStill meh.\nRisks\nSame.\nRecommendations\nWait.";

    let orchestrator = orchestrator_with(
        store.clone(),
        Arc::new(FakeClassifier),
        Arc::new(FakeNarrator::sequence(vec![WEAK_NARRATIVE, REGENERATED_NARRATIVE])),
        // Regeneration scores *lower* than the original (30 < 50); the spec
        // says it's accepted regardless.
        Arc::new(FakeJudge::sequence(vec![50, 30])),
        Arc::new(FakeVisualizer { fail_permanently: false }),
        Arc::new(FakeProjector::always_succeeds()),
        sink,
    );

    orchestrator.handle(job_id, 1).await.unwrap();

    let job = store.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let narrative = job.narrative.unwrap();
    assert_eq!(narrative.text, REGENERATED_NARRATIVE);
    assert_eq!(narrative.quality_score, 30);
}

#[tokio::test]
async fn scenario_9_job_timeout_emits_cancelled_result_for_in_flight_worker() {
    let store = Arc::new(FakeStore::default());
    store.instruments.lock().unwrap().insert(
        "ACME".to_string(),
        Instrument {
            symbol: "ACME".to_string(),
            display_name: "Acme".to_string(),
            kind_hint: "equity".to_string(),
            current_price: Some(10.0),
            asset_class_map: AllocationMap::new(HashMap::from([("equity".to_string(), 100.0)])),
            region_map: AllocationMap::default(),
            sector_map: AllocationMap::default(),
        },
    );
    let job_id = seed_job(&store, JobKind::PortfolioAnalysis);
    let sink = Arc::new(RecordingEventSink::default());

    let mut config = test_config();
    config.job_timeout_ms = 100;
    config.worker_timeout_ms = 60_000;

    let orchestrator = orchestrator_with_config(
        store.clone(),
        Arc::new(FakeClassifier),
        Arc::new(HangingNarrator),
        Arc::new(FakeJudge::always(90)),
        Arc::new(FakeVisualizer { fail_permanently: false }),
        Arc::new(FakeProjector::always_succeeds()),
        sink.clone(),
        config,
    );

    orchestrator.handle(job_id, 1).await.unwrap();

    let job = store.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.unwrap().kind, planner_core::error::ErrorKind::Timeout);

    let events = sink.events.lock().unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::WorkerResult { worker: Worker::Narrator, outcome: Outcome::Cancelled, .. }
    )));
}
