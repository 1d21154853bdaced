//! The `handle(job_id)` state machine (spec §4.1): fetch the job, refuse
//! poison and already-terminal messages, run pre-processing and worker
//! dispatch under a job-level timeout, and persist the outcome.

use std::sync::Arc;
use std::time::Duration;

use planner_core::contracts::UserProfile;
use planner_core::domain::{ErrorDetail, JobId, JobKind, JobStatus, SummaryPayload, UNCLASSIFIED_BUCKET};
use planner_core::error::PlannerError;
use planner_core::events::{Event, EventSink};
use planner_core::snapshot::build_snapshot;
use planner_core::traits::{Classifier, JobPayload, MarketOracle, Narrator, Projector, QualityJudge, Store, Visualizer};
use shared::config::PlannerConfig;
use shared::retry::RetryPolicy;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::Dispatcher;
use crate::preprocessing::Preprocessor;

pub struct Orchestrator {
    pub store: Arc<dyn Store>,
    pub oracle: Arc<dyn MarketOracle>,
    pub classifier: Arc<dyn Classifier>,
    pub narrator: Arc<dyn Narrator>,
    pub quality_judge: Arc<dyn QualityJudge>,
    pub visualizer: Arc<dyn Visualizer>,
    pub projector: Arc<dyn Projector>,
    pub sink: Arc<dyn EventSink>,
    pub config: PlannerConfig,
}

impl Orchestrator {
    /// Runs one job to a terminal state. `delivery_attempts` comes from the
    /// queue message; messages beyond `poison_attempt_threshold` are failed
    /// immediately without being retried against the workers at all.
    pub async fn handle(&self, job_id: JobId, delivery_attempts: u32) -> Result<(), PlannerError> {
        let job = self.store.get_job(job_id).await?;
        if job.status.is_terminal() {
            tracing::debug!(job_id = %job_id, status = %job.status, "job already terminal, skipping");
            return Ok(());
        }

        if delivery_attempts > self.config.poison_attempt_threshold {
            let detail = ErrorDetail {
                kind: planner_core::error::ErrorKind::Poison,
                cause: format!("redelivered {delivery_attempts} times, exceeding threshold"),
            };
            self.store.fail_job(job_id, detail).await?;
            self.sink.emit(Event::JobTerminal {
                job_id,
                status: JobStatus::Failed,
                error_kind: Some(planner_core::error::ErrorKind::Poison),
            });
            return Ok(());
        }

        self.store.set_job_status(job_id, JobStatus::Running).await?;
        self.sink.emit(Event::JobStarted { job_id });

        if job.kind == JobKind::Rebalance {
            let detail = ErrorDetail {
                kind: planner_core::error::ErrorKind::Permanent,
                cause: "rebalance jobs are not yet backed by a worker set".to_string(),
            };
            self.store.fail_job(job_id, detail.clone()).await?;
            self.sink.emit(Event::JobTerminal {
                job_id,
                status: JobStatus::Failed,
                error_kind: Some(detail.kind),
            });
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let deadline = Duration::from_millis(self.config.job_timeout_ms);

        // Race the job against the deadline without dropping `run_job` on
        // expiry: tripping `cancel` lets the in-flight worker calls observe
        // it and emit their own `worker.result(cancelled)` before the job
        // as a whole resolves, rather than the timeout combinator simply
        // discarding their futures mid-flight.
        let mut run_fut = std::pin::pin!(self.run_job(job_id, &cancel));
        tokio::select! {
            result = &mut run_fut => {
                return self.finish(job_id, result).await;
            }
            _ = tokio::time::sleep(deadline) => {}
        }

        cancel.cancel();
        let result = run_fut.await;
        if matches!(result, Err(PlannerError::Cancelled)) {
            let detail = ErrorDetail {
                kind: planner_core::error::ErrorKind::Timeout,
                cause: format!("job exceeded {}ms deadline", self.config.job_timeout_ms),
            };
            self.store.fail_job(job_id, detail).await?;
            self.sink.emit(Event::JobTerminal {
                job_id,
                status: JobStatus::Failed,
                error_kind: Some(planner_core::error::ErrorKind::Timeout),
            });
            return Ok(());
        }
        self.finish(job_id, result).await
    }

    /// Persists and emits the terminal state for a job that ran to its own
    /// completion (success or a non-timeout error).
    async fn finish(&self, job_id: JobId, result: Result<(), PlannerError>) -> Result<(), PlannerError> {
        match result {
            Ok(()) => {
                self.sink.emit(Event::JobTerminal { job_id, status: JobStatus::Completed, error_kind: None });
                Ok(())
            }
            Err(err) => {
                let detail = ErrorDetail { kind: err.kind(), cause: err.to_string() };
                self.store.fail_job(job_id, detail).await?;
                self.sink.emit(Event::JobTerminal { job_id, status: JobStatus::Failed, error_kind: Some(err.kind()) });
                Ok(())
            }
        }
    }

    async fn run_job(&self, job_id: JobId, cancel: &CancellationToken) -> Result<(), PlannerError> {
        let job = self.store.get_job(job_id).await?;
        let accounts = self.store.list_accounts(job.owner).await?;
        let mut positions = Vec::new();
        for account in &accounts {
            positions.extend(self.store.list_positions(account.id).await?);
        }

        let preprocess_retry = RetryPolicy::new(
            self.config.backoff_base_ms,
            self.config.backoff_factor,
            self.config.backoff_cap_ms,
            self.config.backoff_jitter,
        );
        let preprocessor = Preprocessor {
            store: self.store.clone(),
            oracle: self.oracle.clone(),
            classifier: self.classifier.clone(),
            retry: preprocess_retry,
            sink: self.sink.clone(),
            price_budget_ms: self.config.price_budget_ms,
        };
        let instruments = preprocessor.run(job_id, &accounts, &positions, cancel).await?;
        let snapshot = build_snapshot(&accounts, &positions, &instruments);

        let dispatcher = Dispatcher {
            narrator: self.narrator.clone(),
            quality_judge: self.quality_judge.clone(),
            visualizer: self.visualizer.clone(),
            projector: self.projector.clone(),
            config: self.config.clone(),
            sink: self.sink.clone(),
        };

        let profile = UserProfile { risk_profile: job.input.risk_profile.clone(), context_notes: Vec::new() };
        let result = dispatcher
            .run(
                job_id,
                snapshot.clone(),
                profile,
                job.input.retirement_horizon_years,
                job.input.annual_income_target,
                cancel,
            )
            .await?;

        self.store.write_job_payload(job_id, JobPayload::Narrative(result.narrative)).await?;
        self.store.write_job_payload(job_id, JobPayload::Charts(result.charts)).await?;
        self.store.write_job_payload(job_id, JobPayload::Projections(result.projections)).await?;

        let headline = if snapshot.asset_class_weights.contains_key(UNCLASSIFIED_BUCKET) {
            "Portfolio analysis complete, some holdings unclassified".to_string()
        } else {
            "Portfolio analysis complete".to_string()
        };
        self.store
            .write_job_payload(
                job_id,
                JobPayload::Summary(SummaryPayload { total_value: snapshot.total_value, headline }),
            )
            .await?;

        self.store.set_job_status(job_id, JobStatus::Completed).await?;
        Ok(())
    }
}
