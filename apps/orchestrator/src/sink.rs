//! The default `EventSink`: logs every lifecycle event through `tracing`.
//! Tests substitute a `RecordingEventSink` to assert on event sequences.

use planner_core::events::{Event, EventSink};

pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: Event) {
        match event {
            Event::JobStarted { job_id } => {
                tracing::info!(job_id = %job_id, "job started");
            }
            Event::PreprocessDone { job_id, stage, counts, duration_ms } => {
                tracing::info!(job_id = %job_id, stage, counts, duration_ms, "preprocess stage done");
            }
            Event::WorkerAttempt { job_id, worker, attempt_no } => {
                tracing::debug!(job_id = %job_id, %worker, attempt_no, "worker attempt");
            }
            Event::WorkerResult { job_id, worker, outcome, duration_ms } => {
                tracing::info!(job_id = %job_id, %worker, ?outcome, duration_ms, "worker result");
            }
            Event::JobTerminal { job_id, status, error_kind } => {
                tracing::info!(job_id = %job_id, %status, ?error_kind, "job reached terminal state");
            }
        }
    }
}
