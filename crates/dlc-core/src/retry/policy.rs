use std::time::Duration;

use crate::config::QualityConfig;

/// Classification of one attempt's result for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Worth asking again (e.g. the engine answered with an empty list).
    Transient,
    /// Success or a definite failure; return it as is.
    Final,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Fixed-delay policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&QualityConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &QualityConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            delay: Duration::from_millis(cfg.retry_delay_ms),
        }
    }

    /// `attempt` is 1-based (1 = first attempt).
    pub fn decide(&self, attempt: u32, outcome: AttemptOutcome) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }
        match outcome {
            AttemptOutcome::Final => RetryDecision::NoRetry,
            AttemptOutcome::Transient => RetryDecision::RetryAfter(self.delay),
        }
    }
}
