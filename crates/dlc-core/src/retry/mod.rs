//! Retry policy and async retry loop.
//!
//! Callers classify each attempt's result as transient or final; the policy
//! decides whether to wait and try again.

mod policy;
mod run;

pub use policy::{AttemptOutcome, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
