//! Quality extraction proxy: asks the engine which stream variants a video
//! offers, retrying while the engine is still warming up.

mod format;

use std::sync::Arc;

use crate::engine::{Engine, EngineError, QualityOption};
use crate::retry::{run_with_retry, AttemptOutcome, RetryPolicy};

pub use format::{format_selector_for_height, format_selector_for_resolution, AUDIO_ONLY_SELECTOR};

/// Qualities relayed back to the extension.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QualityReport {
    pub qualities: Vec<QualityOption>,
    /// The engine answered from a fallback list instead of a real probe.
    pub fallback: bool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("download engine is not connected")]
    Unavailable,
    #[error("download engine did not answer in time")]
    Timeout,
    #[error("{0}")]
    Engine(String),
}

impl From<EngineError> for ExtractionError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Unavailable | EngineError::Closed => ExtractionError::Unavailable,
            EngineError::Timeout(_) => ExtractionError::Timeout,
            EngineError::Encode(msg) => ExtractionError::Engine(msg),
        }
    }
}

pub struct QualityProxy {
    engine: Arc<dyn Engine>,
    policy: RetryPolicy,
}

impl QualityProxy {
    pub fn new(engine: Arc<dyn Engine>, policy: RetryPolicy) -> Self {
        Self { engine, policy }
    }

    /// Requests qualities for `url`. Only a successful but empty answer is
    /// retried; when attempts run out the empty report is returned as is.
    pub async fn extract_qualities(&self, url: &str) -> Result<QualityReport, ExtractionError> {
        let engine = &self.engine;
        let reply = run_with_retry(
            &self.policy,
            |attempt| {
                tracing::debug!(url, attempt, "requesting qualities");
                engine.request_qualities(url)
            },
            |result| match result {
                Ok(reply) if reply.success && reply.qualities.is_empty() => {
                    AttemptOutcome::Transient
                }
                _ => AttemptOutcome::Final,
            },
        )
        .await?;

        if !reply.success {
            let msg = reply
                .error
                .unwrap_or_else(|| "quality extraction failed".to_string());
            tracing::warn!(url, error = %msg, "engine rejected quality extraction");
            return Err(ExtractionError::Engine(msg));
        }

        tracing::info!(url, count = reply.qualities.len(), "qualities extracted");
        Ok(QualityReport {
            qualities: reply.qualities,
            fallback: reply.fallback.unwrap_or(false),
        })
    }
}
