//! Download intents and the session registry.
//!
//! An intent is a candidate download tracked from its first observation in a
//! page until it is handed to the engine or expires. The registry is owned by
//! a single coordinator; callers serialize access to it.

mod registry;
mod relation;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

pub use registry::SessionRegistry;
pub use relation::{correlation_tag, is_related, RelationPolicy};

/// Identifier of an intent; increases with creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntentId(pub u64);

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where the browser side saw the download. Diagnostics only; never used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceEvent {
    #[default]
    LinkClick,
    ProgrammaticClick,
    WindowOpen,
    LocationChange,
    FormSubmit,
    FetchResponse,
    XhrResponse,
    NativeDownloadEvent,
}

/// Lifecycle state of an intent.
///
/// `Pending → Resolved → Dispatched`, with `PersistedLocally` as a detour while
/// the engine is unreachable. `Expired` is only reachable from the two active
/// states: once a command has left for the engine it never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Pending,
    Resolved,
    Dispatched,
    PersistedLocally,
    Expired,
}

impl IntentStatus {
    /// Pending and Resolved intents are "active": they own their observed URL.
    pub fn is_active(self) -> bool {
        matches!(self, IntentStatus::Pending | IntentStatus::Resolved)
    }

    pub fn can_transition_to(self, next: IntentStatus) -> bool {
        use IntentStatus::*;
        matches!(
            (self, next),
            (Pending, Resolved)
                | (Resolved, Resolved)
                | (Resolved, Dispatched)
                | (Resolved, PersistedLocally)
                | (PersistedLocally, Dispatched)
                | (Pending, Expired)
                | (Resolved, Expired)
        )
    }
}

/// Optional fields supplied with a registration; `None` leaves existing values alone.
#[derive(Debug, Clone, Default)]
pub struct IntentMetadata {
    pub file_name: Option<String>,
    pub page_url: Option<String>,
    pub source_event: Option<SourceEvent>,
}

#[derive(Debug, Clone)]
pub struct DownloadIntent {
    pub id: IntentId,
    /// URL as first observed; may be an interstitial page.
    pub observed_url: String,
    /// Direct URL once known.
    pub final_url: Option<String>,
    pub file_name: Option<String>,
    pub page_url: String,
    pub source_event: SourceEvent,
    pub created_at: Instant,
    pub resolved_at: Option<Instant>,
    /// Set when the intent was handed to the engine or persisted for replay.
    pub handed_off_at: Option<Instant>,
    pub status: IntentStatus,
    /// Opaque key derived from the observed URL, compared against final URLs.
    pub correlation_tag: String,
}

impl DownloadIntent {
    /// URL the engine should fetch: the final URL when resolved, else the observed one.
    pub fn target_url(&self) -> &str {
        self.final_url.as_deref().unwrap_or(&self.observed_url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("intent {0} not found")]
    NotFound(IntentId),
    #[error("intent {id}: invalid transition {from:?} -> {to:?}")]
    Invalid {
        id: IntentId,
        from: IntentStatus,
        to: IntentStatus,
    },
}
