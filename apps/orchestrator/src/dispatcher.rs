//! Worker dispatch (spec §4.3): Narrator, Visualizer, and Projector run
//! concurrently, each under its own retry policy and per-attempt deadline.
//! The Narrator's draft additionally passes through the Quality Judge,
//! with one regeneration attempt if it scores below threshold.

use std::sync::Arc;
use std::time::{Duration, Instant};

use planner_core::contracts::{
    NarratorRequest, ProjectorRequest, QualityJudgeRequest, UserProfile, VisualizerRequest,
};
use planner_core::domain::{
    ChartsPayload, JobId, NarrativePayload, PortfolioSnapshot, ProjectionsPayload,
};
use planner_core::error::{ErrorKind, PlannerError};
use planner_core::events::{Event, EventSink, Outcome, Worker};
use planner_core::traits::{Narrator, Projector, QualityJudge, Visualizer};
use shared::config::PlannerConfig;
use shared::retry::RetryPolicy;
use tokio_util::sync::CancellationToken;

use crate::validation::{narrative_payload, validate_charts, validate_narrative_headings, validate_projection};

pub struct Dispatcher {
    pub narrator: Arc<dyn Narrator>,
    pub quality_judge: Arc<dyn QualityJudge>,
    pub visualizer: Arc<dyn Visualizer>,
    pub projector: Arc<dyn Projector>,
    pub config: PlannerConfig,
    pub sink: Arc<dyn EventSink>,
}

pub struct DispatchResult {
    pub narrative: NarrativePayload,
    pub charts: ChartsPayload,
    pub projections: ProjectionsPayload,
}

impl Dispatcher {
    pub async fn run(
        &self,
        job_id: JobId,
        snapshot: PortfolioSnapshot,
        profile: UserProfile,
        retirement_horizon_years: u32,
        annual_income_target: f64,
        cancel: &CancellationToken,
    ) -> Result<DispatchResult, PlannerError> {
        let retry = RetryPolicy::new(
            self.config.backoff_base_ms,
            self.config.backoff_factor,
            self.config.backoff_cap_ms,
            self.config.backoff_jitter,
        );

        let narrative_fut = self.run_narrative(job_id, snapshot.clone(), profile, &retry, cancel);
        let charts_fut = self.run_charts(job_id, snapshot.clone(), &retry, cancel);
        let projections_fut = self.run_projections(
            job_id,
            snapshot,
            retirement_horizon_years,
            annual_income_target,
            &retry,
            cancel,
        );

        let (narrative, charts, projections) =
            tokio::join!(narrative_fut, charts_fut, projections_fut);

        Ok(DispatchResult { narrative: narrative?, charts: charts?, projections: projections? })
    }

    async fn run_narrative(
        &self,
        job_id: JobId,
        snapshot: PortfolioSnapshot,
        profile: UserProfile,
        retry: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<NarrativePayload, PlannerError> {
        let headings = self.config.narrator_required_headings.clone();
        let timeout = Duration::from_millis(self.config.worker_timeout_ms);

        let validation_failures = std::cell::Cell::new(0u32);
        let mut text = retry
            .run(
                self.config.worker_max_attempts,
                should_retry_with_validation_cap(&validation_failures),
                cancel,
                |attempt| {
                    self.call_narrator(job_id, snapshot.clone(), profile.clone(), &headings, timeout, attempt, cancel)
                },
            )
            .await?;

        let mut score = self.judge(job_id, &text, cancel).await?;
        if score < self.config.judge_threshold {
            tracing::info!(job_id = %job_id, score, "narrative scored below threshold, regenerating once");
            let regen_validation_failures = std::cell::Cell::new(0u32);
            let regenerated = retry
                .run(
                    1,
                    should_retry_with_validation_cap(&regen_validation_failures),
                    cancel,
                    |attempt| {
                        self.call_narrator(job_id, snapshot.clone(), profile.clone(), &headings, timeout, attempt, cancel)
                    },
                )
                .await;
            if let Ok(candidate) = regenerated {
                // Spec: the regenerated draft is accepted regardless of its
                // score against the original — it already passed structural
                // validation by the time it gets here.
                score = self.judge(job_id, &candidate, cancel).await?;
                text = candidate;
            }
        }

        Ok(narrative_payload(planner_core::contracts::NarratorResponse { text }, score))
    }

    #[allow(clippy::too_many_arguments)]
    async fn call_narrator(
        &self,
        job_id: JobId,
        snapshot: PortfolioSnapshot,
        profile: UserProfile,
        headings: &[String],
        timeout: Duration,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> Result<String, PlannerError> {
        self.sink.emit(Event::WorkerAttempt { job_id, worker: Worker::Narrator, attempt_no: attempt + 1 });
        let start = Instant::now();

        let result = tokio::select! {
            res = tokio::time::timeout(timeout, self.narrator.narrate(NarratorRequest { snapshot, profile })) => {
                res
                    .map_err(|_| PlannerError::Timeout { elapsed_ms: timeout.as_millis() as u64 })
                    .and_then(|r| r)
                    .and_then(|response| {
                        validate_narrative_headings(&response.text, headings)?;
                        Ok(response.text)
                    })
            }
            _ = cancel.cancelled() => Err(PlannerError::Cancelled),
        };

        self.sink.emit(Event::WorkerResult {
            job_id,
            worker: Worker::Narrator,
            outcome: outcome_of(&result),
            duration_ms: start.elapsed().as_millis() as u64,
        });
        result
    }

    async fn judge(&self, job_id: JobId, text: &str, cancel: &CancellationToken) -> Result<u8, PlannerError> {
        let retry = RetryPolicy::new(
            self.config.backoff_base_ms,
            self.config.backoff_factor,
            self.config.backoff_cap_ms,
            self.config.backoff_jitter,
        );
        let timeout = Duration::from_millis(self.config.worker_timeout_ms);
        let validation_failures = std::cell::Cell::new(0u32);

        retry
            .run(
                self.config.worker_max_attempts,
                should_retry_with_validation_cap(&validation_failures),
                cancel,
                |attempt| {
                    let text = text.to_string();
                    async move {
                        self.sink.emit(Event::WorkerAttempt {
                            job_id,
                            worker: Worker::QualityJudge,
                            attempt_no: attempt + 1,
                        });
                        let start = Instant::now();
                        let result = tokio::select! {
                            res = tokio::time::timeout(timeout, self.quality_judge.judge(QualityJudgeRequest { text })) => {
                                res
                                    .map_err(|_| PlannerError::Timeout { elapsed_ms: timeout.as_millis() as u64 })
                                    .and_then(|r| r)
                                    .map(|response| response.score)
                            }
                            _ = cancel.cancelled() => Err(PlannerError::Cancelled),
                        };

                        self.sink.emit(Event::WorkerResult {
                            job_id,
                            worker: Worker::QualityJudge,
                            outcome: outcome_of(&result),
                            duration_ms: start.elapsed().as_millis() as u64,
                        });
                        result
                    }
                },
            )
            .await
    }

    async fn run_charts(
        &self,
        job_id: JobId,
        snapshot: PortfolioSnapshot,
        retry: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<ChartsPayload, PlannerError> {
        let timeout = Duration::from_millis(self.config.worker_timeout_ms);
        let (min, max) = (self.config.chart_count_min, self.config.chart_count_max);
        let validation_failures = std::cell::Cell::new(0u32);

        retry
            .run(
                self.config.worker_max_attempts,
                should_retry_with_validation_cap(&validation_failures),
                cancel,
                |attempt| {
                    let snapshot = snapshot.clone();
                    async move {
                        self.sink.emit(Event::WorkerAttempt { job_id, worker: Worker::Visualizer, attempt_no: attempt + 1 });
                        let start = Instant::now();
                        let result = tokio::select! {
                            res = tokio::time::timeout(timeout, self.visualizer.visualize(VisualizerRequest { snapshot })) => {
                                res
                                    .map_err(|_| PlannerError::Timeout { elapsed_ms: timeout.as_millis() as u64 })
                                    .and_then(|r| r)
                                    .and_then(|response| validate_charts(response, min, max))
                            }
                            _ = cancel.cancelled() => Err(PlannerError::Cancelled),
                        };

                        self.sink.emit(Event::WorkerResult {
                            job_id,
                            worker: Worker::Visualizer,
                            outcome: outcome_of(&result),
                            duration_ms: start.elapsed().as_millis() as u64,
                        });
                        result
                    }
                },
            )
            .await
    }

    async fn run_projections(
        &self,
        job_id: JobId,
        snapshot: PortfolioSnapshot,
        retirement_horizon_years: u32,
        annual_income_target: f64,
        retry: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<ProjectionsPayload, PlannerError> {
        let timeout = Duration::from_millis(self.config.worker_timeout_ms);
        let validation_failures = std::cell::Cell::new(0u32);

        retry
            .run(
                self.config.worker_max_attempts,
                should_retry_with_validation_cap(&validation_failures),
                cancel,
                |attempt| {
                    let snapshot = snapshot.clone();
                    async move {
                        self.sink.emit(Event::WorkerAttempt { job_id, worker: Worker::Projector, attempt_no: attempt + 1 });
                        let start = Instant::now();
                        let result = tokio::select! {
                            res = tokio::time::timeout(
                                timeout,
                                self.projector.project(ProjectorRequest {
                                    snapshot,
                                    retirement_horizon_years,
                                    annual_income_target,
                                }),
                            ) => {
                                res
                                    .map_err(|_| PlannerError::Timeout { elapsed_ms: timeout.as_millis() as u64 })
                                    .and_then(|r| r)
                                    .and_then(validate_projection)
                            }
                            _ = cancel.cancelled() => Err(PlannerError::Cancelled),
                        };

                        self.sink.emit(Event::WorkerResult {
                            job_id,
                            worker: Worker::Projector,
                            outcome: outcome_of(&result),
                            duration_ms: start.elapsed().as_millis() as u64,
                        });
                        result
                    }
                },
            )
            .await
    }
}

fn outcome_of<T>(result: &Result<T, PlannerError>) -> Outcome {
    match result {
        Ok(_) => Outcome::Ok,
        Err(PlannerError::Cancelled) => Outcome::Cancelled,
        Err(err) => err.kind().into(),
    }
}

/// Builds a `should_retry` predicate that allows `transient` failures up to
/// the caller's `max_attempts`, but a `validation` failure only one retry
/// (spec §4.3: malformed output gets one extra attempt, not the full
/// transient budget) regardless of how many attempts remain.
fn should_retry_with_validation_cap(validation_failures: &std::cell::Cell<u32>) -> impl Fn(&PlannerError) -> bool + '_ {
    move |err: &PlannerError| {
        if !err.is_retryable() {
            return false;
        }
        if err.kind() == ErrorKind::Validation {
            if validation_failures.get() >= 1 {
                return false;
            }
            validation_failures.set(validation_failures.get() + 1);
        }
        true
    }
}
