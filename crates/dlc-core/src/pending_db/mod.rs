//! Durable queue of engine commands that could not be delivered (SQLite via sqlx).
//!
//! Records are replayed in insertion order once the engine reconnects and
//! cleared as a batch afterwards.

mod db;
mod queue;

pub use db::PendingDb;

use crate::engine::EngineCommand;
use crate::intent::IntentId;

/// Row id of a persisted command; increases with enqueue order.
pub type PendingId = i64;

/// One command waiting for the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEngineCommand {
    pub id: PendingId,
    /// Intent the command was built from, when it came from the registry.
    pub intent_id: Option<IntentId>,
    pub command: EngineCommand,
    /// Unix seconds.
    pub enqueued_at: i64,
}
