//! The event-sink seam (spec §9): a small, synchronous interface the
//! orchestrator pushes lifecycle events through. `TracingEventSink` (the
//! default, in `infrastructure`) just logs each event; tests substitute a
//! `RecordingEventSink` to assert on event sequences (spec §8's scenarios).

use crate::domain::JobId;
use crate::error::ErrorKind;

/// Which worker an event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Worker {
    Classifier,
    Narrator,
    QualityJudge,
    Visualizer,
    Projector,
}

impl std::fmt::Display for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Worker::Classifier => "classifier",
            Worker::Narrator => "narrator",
            Worker::QualityJudge => "quality_judge",
            Worker::Visualizer => "visualizer",
            Worker::Projector => "projector",
        };
        f.write_str(s)
    }
}

/// The outcome of one worker attempt, distinguishing the retryable kinds
/// from terminal ones without needing the full `PlannerError` in hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Transient,
    Validation,
    Permanent,
    Cancelled,
}

impl From<ErrorKind> for Outcome {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Transient | ErrorKind::NotFound | ErrorKind::Timeout | ErrorKind::Poison => {
                Outcome::Transient
            }
            ErrorKind::Validation => Outcome::Validation,
            ErrorKind::Permanent | ErrorKind::Internal => Outcome::Permanent,
        }
    }
}

/// The five lifecycle events a job passes through (spec §6's observability
/// surface). `JobId` identifies the job for every variant.
#[derive(Debug, Clone)]
pub enum Event {
    JobStarted {
        job_id: JobId,
    },
    PreprocessDone {
        job_id: JobId,
        stage: &'static str,
        counts: usize,
        duration_ms: u64,
    },
    WorkerAttempt {
        job_id: JobId,
        worker: Worker,
        attempt_no: u32,
    },
    WorkerResult {
        job_id: JobId,
        worker: Worker,
        outcome: Outcome,
        duration_ms: u64,
    },
    JobTerminal {
        job_id: JobId,
        status: crate::domain::JobStatus,
        error_kind: Option<ErrorKind>,
    },
}

/// The sink every emitted `Event` is pushed through. Implementations must
/// not block the caller on slow I/O — `TracingEventSink` just logs.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}
