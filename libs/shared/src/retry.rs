//! Exponential backoff with jitter, reused by the Classifier pre-pass and
//! the per-worker dispatcher (one generic policy object rather than two
//! copies of the same loop — spec §9). Generalizes the fixed-retry-count
//! loop a simpler supervisor would use into a full backoff schedule.

use std::time::Duration;

use planner_core::error::PlannerError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub factor: f64,
    pub cap: Duration,
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn new(base_ms: u64, factor: f64, cap_ms: u64, jitter: f64) -> Self {
        Self {
            base: Duration::from_millis(base_ms),
            factor,
            cap: Duration::from_millis(cap_ms),
            jitter,
        }
    }

    /// Delay before attempt `n` (0-indexed): `min(cap, base * factor^n)`,
    /// jittered by `± jitter` fraction.
    fn delay_for(&self, attempt: u32, rng: &mut StdRng) -> Duration {
        let raw = self.base.as_millis() as f64 * self.factor.powi(attempt as i32);
        let capped = raw.min(self.cap.as_millis() as f64);
        let jitter_span = capped * self.jitter;
        let jittered = capped + rng.gen_range(-jitter_span..=jitter_span);
        Duration::from_millis(jittered.max(0.0) as u64)
    }

    /// Runs `f` up to `max_attempts` times, retrying only when
    /// `should_retry` accepts the error. Honors `cancel`: a cancellation
    /// observed during the inter-attempt sleep short-circuits with
    /// `PlannerError::Cancelled`.
    pub async fn run<F, Fut, T>(
        &self,
        max_attempts: u32,
        should_retry: impl Fn(&PlannerError) -> bool,
        cancel: &CancellationToken,
        mut f: F,
    ) -> Result<T, PlannerError>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T, PlannerError>>,
    {
        let rng = Mutex::new(StdRng::from_entropy());
        self.run_with_rng(max_attempts, should_retry, cancel, &rng, f).await
    }

    /// Same as `run`, but takes a caller-owned `StdRng` so tests can seed it
    /// for deterministic backoff delays.
    pub async fn run_with_rng<F, Fut, T>(
        &self,
        max_attempts: u32,
        should_retry: impl Fn(&PlannerError) -> bool,
        cancel: &CancellationToken,
        rng: &Mutex<StdRng>,
        mut f: F,
    ) -> Result<T, PlannerError>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T, PlannerError>>,
    {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(PlannerError::Cancelled);
            }
            match f(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= max_attempts || !should_retry(&err) {
                        return Err(err);
                    }
                    let delay = {
                        let mut guard = rng.lock().await;
                        self.delay_for(attempt - 1, &mut guard)
                    };
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(PlannerError::Cancelled),
                    }
                }
            }
        }
    }
}
