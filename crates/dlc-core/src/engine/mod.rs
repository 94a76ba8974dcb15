//! The single logical connection to the download engine.
//!
//! Consumers talk to the engine through the [`Engine`] trait so the
//! dispatcher and quality proxy can be tested against an in-process fake;
//! [`EngineClient`] is the WebSocket implementation with the reconnect loop.

mod client;
#[cfg(test)]
pub(crate) mod fake;
mod wire;

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;

pub use client::{EngineClient, EngineClientOptions};
pub use wire::{epoch_millis, EngineCommand, QualitiesReply, QualityOption};
pub(crate) use wire::parse_height;

/// Connection state of the engine client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl EngineState {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineState::Disconnected => "disconnected",
            EngineState::Connecting => "connecting",
            EngineState::Connected => "connected",
        }
    }
}

/// Snapshot published on every state change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStatus {
    pub state: EngineState,
    pub last_error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine is not connected")]
    Unavailable,
    #[error("engine did not answer within {0:?}")]
    Timeout(Duration),
    #[error("engine connection closed")]
    Closed,
    #[error("encode engine command: {0}")]
    Encode(String),
}

#[async_trait]
pub trait Engine: Send + Sync {
    fn status(&self) -> EngineStatus;

    fn state(&self) -> EngineState {
        self.status().state
    }

    /// Receiver that observes every status change.
    fn subscribe(&self) -> watch::Receiver<EngineStatus>;

    /// Queues one command for the engine. Returns `Unavailable` unless connected;
    /// a successful return means the frame was handed to the writer.
    fn send(&self, command: &EngineCommand) -> Result<(), EngineError>;

    /// Sends `extractYouTubeQualities` and waits for the matching reply.
    async fn request_qualities(&self, url: &str) -> Result<QualitiesReply, EngineError>;

    /// Cuts the current backoff short. No-op for engines without a reconnect loop.
    fn request_reconnect(&self) {}
}
