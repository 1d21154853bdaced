//! The worker dispatch fan-out primitive (spec §9): wait for N independent
//! units of work, each already wrapped with its own per-attempt deadline,
//! and collect every outcome without short-circuiting on the first failure
//! — every required worker must reach a terminal per-worker status (spec
//! §4.3's ordering guarantee).

use futures_util::future::join_all;
use std::future::Future;

/// Runs every future in `tasks` concurrently to completion and returns all
/// results in the same order they were submitted.
pub async fn fan_out<Fut, T>(tasks: Vec<Fut>) -> Vec<T>
where
    Fut: Future<Output = T>,
{
    join_all(tasks).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collects_every_outcome_even_when_some_fail() {
        let tasks: Vec<_> = vec![
            Box::pin(async { Ok::<u32, &str>(1) }) as std::pin::Pin<Box<dyn Future<Output = Result<u32, &str>>>>,
            Box::pin(async { Err("boom") }),
            Box::pin(async { Ok(3) }),
        ];
        let results = fan_out(tasks).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0], Ok(1));
        assert_eq!(results[1], Err("boom"));
        assert_eq!(results[2], Ok(3));
    }
}
