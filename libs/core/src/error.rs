//! Domain error type and the taxonomy it is classified into.
//!
//! `thiserror` gives every failure mode a distinct, typed variant. `unwrap()`
//! / `expect()` are not used outside tests.

use thiserror::Error;

/// The error-kind taxonomy a failure is classified into for retry decisions
/// and for the job record's `error.kind` field (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Job id missing; terminal for this message, no redelivery.
    NotFound,
    /// Temporary failure in a collaborator; retried per policy.
    Transient,
    /// Structural rejection of worker output; one extra retry.
    Validation,
    /// Caller-side unrecoverable failure (auth, quota); no retry.
    Permanent,
    /// Job-level deadline exceeded; in-flight work cancelled.
    Timeout,
    /// Redelivery threshold exceeded; no further re-run.
    Poison,
    /// Orchestrator-side invariant violation.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Transient => "transient",
            ErrorKind::Validation => "validation",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Poison => "poison",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Domain error type. One variant per failure mode, `#[source]` on wrapped
/// causes. Adapters classify collaborator failures into these variants at
/// the boundary — the dispatcher and state machine never inspect a raw
/// `reqwest::Error` / `sqlx::Error` directly.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("job not found: {job_id}")]
    NotFound { job_id: String },

    #[error("transient failure: {reason}")]
    Transient {
        reason: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("validation failed: {reason}")]
    Validation { reason: String },

    #[error("permanent failure: {reason}")]
    Permanent {
        reason: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("job-level timeout exceeded after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("poison message: redelivery threshold exceeded ({attempts} attempts)")]
    Poison { attempts: u32 },

    #[error("cancelled")]
    Cancelled,

    #[error("internal invariant violation: {reason}")]
    Internal {
        reason: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("store error: {reason}")]
    Store {
        reason: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl PlannerError {
    /// Maps this error onto the taxonomy tag persisted on the job record.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlannerError::NotFound { .. } => ErrorKind::NotFound,
            PlannerError::Transient { .. } => ErrorKind::Transient,
            PlannerError::Validation { .. } => ErrorKind::Validation,
            PlannerError::Permanent { .. } => ErrorKind::Permanent,
            PlannerError::Timeout { .. } => ErrorKind::Timeout,
            PlannerError::Poison { .. } => ErrorKind::Poison,
            PlannerError::Cancelled => ErrorKind::Transient,
            PlannerError::Internal { .. } => ErrorKind::Internal,
            PlannerError::Store { .. } => ErrorKind::Internal,
        }
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        PlannerError::Transient { reason: reason.into(), source: None }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        PlannerError::Validation { reason: reason.into() }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        PlannerError::Permanent { reason: reason.into(), source: None }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        PlannerError::Internal { reason: reason.into(), source: None }
    }

    pub fn store(reason: impl Into<String>) -> Self {
        PlannerError::Store { reason: reason.into(), source: None }
    }

    /// Whether the per-worker / classifier-pass retry policy should attempt
    /// this error kind at all (spec §4.3: `permanent` and `cancelled` fail
    /// immediately without retry).
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::Validation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_matches_taxonomy_tags() {
        assert_eq!(ErrorKind::NotFound.to_string(), "not_found");
        assert_eq!(ErrorKind::Transient.to_string(), "transient");
        assert_eq!(ErrorKind::Validation.to_string(), "validation");
        assert_eq!(ErrorKind::Permanent.to_string(), "permanent");
        assert_eq!(ErrorKind::Timeout.to_string(), "timeout");
        assert_eq!(ErrorKind::Poison.to_string(), "poison");
        assert_eq!(ErrorKind::Internal.to_string(), "internal");
    }

    #[test]
    fn permanent_and_cancelled_are_not_retryable() {
        assert!(!PlannerError::permanent("nope").is_retryable());
        assert!(!PlannerError::Cancelled.is_retryable());
    }

    #[test]
    fn transient_and_validation_are_retryable() {
        assert!(PlannerError::transient("flaky").is_retryable());
        assert!(PlannerError::validation("bad shape").is_retryable());
    }
}
