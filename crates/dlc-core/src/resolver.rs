//! Redirect resolution: turning page-level observations and later final-URL
//! events into Resolved intents.
//!
//! A page often shows us an interstitial URL first (a redirect page, a
//! `goto` link) and only later reveals the real file, either through a
//! browser download event, an explicit `link_resolved` message, or a HEAD
//! probe. These functions apply the state machine transitions on the
//! registry; dispatching is left to the caller.

use crate::intent::{IntentId, IntentMetadata, SessionRegistry, SourceEvent, TransitionError};
use crate::url_model::{derive_filename, is_direct_file_url};

/// Result of observing a page-level candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The URL already looked like a file; the intent is ready to dispatch.
    Resolved(IntentId),
    /// The URL is ambiguous; the intent waits for a final-URL event.
    Pending(IntentId),
}

impl Observation {
    pub fn id(self) -> IntentId {
        match self {
            Observation::Resolved(id) | Observation::Pending(id) => id,
        }
    }
}

/// A later event that names the real download URL.
#[derive(Debug, Clone)]
pub struct FinalUrlEvent {
    /// URL the page originally showed, when the event carries it (`link_resolved`).
    pub original_url: Option<String>,
    pub final_url: String,
    pub file_name: Option<String>,
    pub page_url: Option<String>,
    pub source_event: SourceEvent,
}

impl FinalUrlEvent {
    pub fn new(final_url: impl Into<String>) -> Self {
        Self {
            original_url: None,
            final_url: final_url.into(),
            file_name: None,
            page_url: None,
            source_event: SourceEvent::NativeDownloadEvent,
        }
    }
}

/// Result of applying a final-URL event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Merged into an existing Pending intent.
    Merged(IntentId),
    /// No pending intent matched; a self-sufficient Resolved intent was created.
    AdHoc(IntentId),
}

impl Resolution {
    pub fn id(self) -> IntentId {
        match self {
            Resolution::Merged(id) | Resolution::AdHoc(id) => id,
        }
    }
}

/// Registers a page-level candidate. Direct-file URLs skip the Pending state.
pub fn observe(
    registry: &mut SessionRegistry,
    observed_url: &str,
    meta: IntentMetadata,
) -> Result<Observation, TransitionError> {
    let id = registry.register(observed_url, meta);
    let intent = registry.get(id).ok_or(TransitionError::NotFound(id))?;

    if intent.status == crate::intent::IntentStatus::Resolved {
        return Ok(Observation::Resolved(id));
    }
    if !is_direct_file_url(observed_url) {
        return Ok(Observation::Pending(id));
    }

    let file_name = intent
        .file_name
        .clone()
        .unwrap_or_else(|| derive_filename(observed_url, None));
    registry.mark_resolved(id, observed_url, Some(file_name))?;
    Ok(Observation::Resolved(id))
}

/// Applies a final-URL event: exact original-URL key first, then the oldest
/// related Pending intent, else a new ad-hoc Resolved intent.
pub fn resolve_final(
    registry: &mut SessionRegistry,
    event: FinalUrlEvent,
) -> Result<Resolution, TransitionError> {
    let matched = event
        .original_url
        .as_deref()
        .and_then(|u| registry.lookup_by_observed_url(u))
        .or_else(|| registry.find_related(&event.final_url));

    match matched {
        Some(id) => {
            let existing = registry.get(id).ok_or(TransitionError::NotFound(id))?;
            let file_name = event
                .file_name
                .or_else(|| existing.file_name.clone())
                .unwrap_or_else(|| derive_filename(&event.final_url, None));
            tracing::info!(
                intent = %id,
                observed = %existing.observed_url,
                final_url = %event.final_url,
                "final URL merged into pending intent"
            );
            registry.mark_resolved(id, &event.final_url, Some(file_name))?;
            Ok(Resolution::Merged(id))
        }
        None => {
            let file_name = event
                .file_name
                .unwrap_or_else(|| derive_filename(&event.final_url, None));
            let id = registry.register(
                &event.final_url,
                IntentMetadata {
                    file_name: Some(file_name.clone()),
                    page_url: event.page_url,
                    source_event: Some(event.source_event),
                },
            );
            registry.mark_resolved(id, &event.final_url, Some(file_name))?;
            tracing::debug!(intent = %id, final_url = %event.final_url, "ad-hoc intent resolved");
            Ok(Resolution::AdHoc(id))
        }
    }
}
