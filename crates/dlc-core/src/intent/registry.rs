//! In-memory session registry.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use super::relation::{correlation_tag, RelationPolicy};
use super::{
    DownloadIntent, IntentId, IntentMetadata, IntentStatus, SourceEvent, TransitionError,
};

/// All known intents, indexed by observed URL (active intents only) and by final URL.
///
/// Intents live in a `BTreeMap` keyed by monotonically increasing ids, so
/// iteration order is creation order and the oldest match wins.
#[derive(Debug)]
pub struct SessionRegistry {
    intents: BTreeMap<IntentId, DownloadIntent>,
    by_observed: HashMap<String, IntentId>,
    by_final: HashMap<String, IntentId>,
    next_id: u64,
    policy: RelationPolicy,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(policy: RelationPolicy, ttl: Duration) -> Self {
        Self {
            intents: BTreeMap::new(),
            by_observed: HashMap::new(),
            by_final: HashMap::new(),
            next_id: 1,
            policy,
            ttl,
        }
    }

    pub fn policy(&self) -> RelationPolicy {
        self.policy
    }

    /// Registers a candidate download. If an active intent already exists for
    /// `observed_url` its metadata is updated and its id returned; otherwise a
    /// new Pending intent is created.
    pub fn register(&mut self, observed_url: &str, meta: IntentMetadata) -> IntentId {
        if let Some(id) = self.lookup_by_observed_url(observed_url) {
            if let Some(intent) = self.intents.get_mut(&id) {
                if meta.file_name.is_some() {
                    intent.file_name = meta.file_name;
                }
                if let Some(page_url) = meta.page_url {
                    intent.page_url = page_url;
                }
                if let Some(source_event) = meta.source_event {
                    intent.source_event = source_event;
                }
                tracing::debug!(intent = %id, url = observed_url, "intent refreshed");
                return id;
            }
        }

        let id = IntentId(self.next_id);
        self.next_id += 1;
        let intent = DownloadIntent {
            id,
            observed_url: observed_url.to_string(),
            final_url: None,
            file_name: meta.file_name,
            page_url: meta.page_url.unwrap_or_default(),
            source_event: meta.source_event.unwrap_or(SourceEvent::LinkClick),
            created_at: Instant::now(),
            resolved_at: None,
            handed_off_at: None,
            status: IntentStatus::Pending,
            correlation_tag: correlation_tag(observed_url),
        };
        tracing::debug!(
            intent = %id,
            url = observed_url,
            source = ?intent.source_event,
            "intent registered"
        );
        self.intents.insert(id, intent);
        self.by_observed.insert(observed_url.to_string(), id);
        id
    }

    /// Active (Pending or Resolved) intent for `url`, if any.
    pub fn lookup_by_observed_url(&self, url: &str) -> Option<IntentId> {
        let id = *self.by_observed.get(url)?;
        self.intents
            .get(&id)
            .filter(|i| i.status.is_active())
            .map(|i| i.id)
    }

    /// Most recent intent (any status) that resolved to `url`.
    pub fn lookup_by_final_url(&self, url: &str) -> Option<IntentId> {
        self.by_final.get(url).copied()
    }

    /// Oldest Pending intent whose observed URL is related to `final_url`
    /// under the registry's relation policy.
    pub fn find_related(&self, final_url: &str) -> Option<IntentId> {
        let final_tag = correlation_tag(final_url);
        self.intents
            .values()
            .filter(|i| i.status == IntentStatus::Pending)
            .find(|i| {
                self.policy
                    .matches(&i.correlation_tag, &i.observed_url, &final_tag, final_url)
            })
            .map(|i| i.id)
    }

    pub fn get(&self, id: IntentId) -> Option<&DownloadIntent> {
        self.intents.get(&id)
    }

    fn transition(
        &mut self,
        id: IntentId,
        to: IntentStatus,
    ) -> Result<&mut DownloadIntent, TransitionError> {
        let intent = self
            .intents
            .get_mut(&id)
            .ok_or(TransitionError::NotFound(id))?;
        if !intent.status.can_transition_to(to) {
            return Err(TransitionError::Invalid {
                id,
                from: intent.status,
                to,
            });
        }
        intent.status = to;
        Ok(intent)
    }

    /// Records the direct URL for an intent and moves it to Resolved.
    pub fn mark_resolved(
        &mut self,
        id: IntentId,
        final_url: &str,
        file_name: Option<String>,
    ) -> Result<(), TransitionError> {
        let intent = self.transition(id, IntentStatus::Resolved)?;
        intent.final_url = Some(final_url.to_string());
        intent.resolved_at = Some(Instant::now());
        if file_name.is_some() {
            intent.file_name = file_name;
        }
        tracing::debug!(
            intent = %id,
            observed = %intent.observed_url,
            final_url,
            "intent resolved"
        );
        self.by_final.insert(final_url.to_string(), id);
        Ok(())
    }

    /// Resolved/persisted → Dispatched. The observed URL is released so a new
    /// click on it starts a fresh intent.
    pub fn mark_dispatched(&mut self, id: IntentId) -> Result<(), TransitionError> {
        let intent = self.transition(id, IntentStatus::Dispatched)?;
        intent.handed_off_at = Some(Instant::now());
        let observed = intent.observed_url.clone();
        self.release_observed(&observed, id);
        Ok(())
    }

    /// Resolved → PersistedLocally (engine unreachable, command stored for replay).
    pub fn mark_persisted(&mut self, id: IntentId) -> Result<(), TransitionError> {
        let intent = self.transition(id, IntentStatus::PersistedLocally)?;
        intent.handed_off_at = Some(Instant::now());
        let observed = intent.observed_url.clone();
        self.release_observed(&observed, id);
        Ok(())
    }

    fn release_observed(&mut self, observed_url: &str, id: IntentId) {
        if self.by_observed.get(observed_url) == Some(&id) {
            self.by_observed.remove(observed_url);
        }
    }

    fn forget(&mut self, id: IntentId) -> Option<DownloadIntent> {
        let intent = self.intents.remove(&id)?;
        self.release_observed(&intent.observed_url, id);
        if let Some(final_url) = intent.final_url.as_deref() {
            if self.by_final.get(final_url) == Some(&id) {
                self.by_final.remove(final_url);
            }
        }
        Some(intent)
    }

    /// Expires and drops active intents created more than the TTL before `now`.
    /// Returns how many were evicted; nothing else is notified.
    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<IntentId> = self
            .intents
            .values()
            .filter(|i| i.status.is_active() && now.saturating_duration_since(i.created_at) > self.ttl)
            .map(|i| i.id)
            .collect();

        for id in &expired {
            if self.transition(*id, IntentStatus::Expired).is_ok() {
                if let Some(intent) = self.forget(*id) {
                    tracing::debug!(intent = %id, url = %intent.observed_url, "intent expired");
                }
            }
        }
        expired.len()
    }

    /// Drops Dispatched intents handed off more than `retention` before `now`.
    /// Persisted intents stay until their command is replayed.
    pub fn prune_completed(&mut self, now: Instant, retention: Duration) -> usize {
        let done: Vec<IntentId> = self
            .intents
            .values()
            .filter(|i| {
                i.status == IntentStatus::Dispatched
                    && i.handed_off_at
                        .is_some_and(|t| now.saturating_duration_since(t) > retention)
            })
            .map(|i| i.id)
            .collect();
        for id in &done {
            self.forget(*id);
        }
        done.len()
    }

    /// Intent already carrying `final_url` toward the engine: Resolved within
    /// `window` of `now`, or handed off within it.
    pub fn recently_dispatched(
        &self,
        final_url: &str,
        now: Instant,
        window: Duration,
    ) -> Option<IntentId> {
        let id = self.lookup_by_final_url(final_url)?;
        let intent = self.intents.get(&id)?;
        let since = match intent.status {
            IntentStatus::Resolved => intent.resolved_at,
            IntentStatus::Dispatched | IntentStatus::PersistedLocally => intent.handed_off_at,
            IntentStatus::Pending | IntentStatus::Expired => None,
        };
        since
            .is_some_and(|t| now.saturating_duration_since(t) <= window)
            .then_some(id)
    }

    /// Number of Pending or Resolved intents.
    pub fn active_count(&self) -> usize {
        self.intents.values().filter(|i| i.status.is_active()).count()
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}
