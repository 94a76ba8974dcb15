//! Retry loop: run an async operation until the policy says stop.

use std::future::Future;

use super::policy::{AttemptOutcome, RetryDecision, RetryPolicy};

/// Runs `op` (given the 1-based attempt number) until `classify` calls its
/// result final or attempts run out, sleeping the policy delay in between.
/// The last result is returned either way.
pub async fn run_with_retry<T, E, F, Fut, C>(policy: &RetryPolicy, mut op: F, classify: C) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&Result<T, E>) -> AttemptOutcome,
{
    let mut attempt = 1u32;
    loop {
        let result = op(attempt).await;
        match policy.decide(attempt, classify(&result)) {
            RetryDecision::NoRetry => return result,
            RetryDecision::RetryAfter(d) => {
                tracing::debug!(attempt, delay = ?d, "retrying");
                tokio::time::sleep(d).await;
                attempt += 1;
            }
        }
    }
}
