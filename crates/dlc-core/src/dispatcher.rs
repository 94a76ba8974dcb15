//! Dispatcher: hands resolved intents to the engine, or persists them while
//! the engine is away and replays them once it is back.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::engine::{Engine, EngineCommand, EngineError, EngineState};
use crate::intent::{IntentId, IntentStatus, SessionRegistry, TransitionError};
use crate::pending_db::PendingDb;

/// How a command left the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Handed to the engine connection.
    Sent,
    /// Engine unreachable; stored for replay.
    Queued,
}

impl Ack {
    pub fn as_str(self) -> &'static str {
        match self {
            Ack::Sent => "sent",
            Ack::Queued => "queued",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("pending store: {0:#}")]
    Store(anyhow::Error),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Result of one replay pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayOutcome {
    pub sent: usize,
    /// A send failed mid-batch; the whole batch stays in the store.
    pub interrupted: bool,
}

pub struct Dispatcher {
    engine: Arc<dyn Engine>,
    store: PendingDb,
    registry: Arc<Mutex<SessionRegistry>>,
    replay_lock: Mutex<()>,
}

impl Dispatcher {
    pub fn new(
        engine: Arc<dyn Engine>,
        store: PendingDb,
        registry: Arc<Mutex<SessionRegistry>>,
    ) -> Self {
        Self {
            engine,
            store,
            registry,
            replay_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &PendingDb {
        &self.store
    }

    /// Sends the download command for a Resolved intent.
    ///
    /// The intent is claimed under the registry lock: a second call for the
    /// same intent reports the first outcome and sends nothing.
    pub async fn dispatch(&self, id: IntentId) -> Result<Ack, DispatchError> {
        // Held until the command is sent or stored, so a concurrent replay
        // pass cannot list the store before this command lands in it.
        let _replay = self.replay_lock.lock().await;
        let mut reg = self.registry.lock().await;
        let intent = reg.get(id).ok_or(TransitionError::NotFound(id))?;
        match intent.status {
            IntentStatus::Resolved => {}
            IntentStatus::Dispatched => return Ok(Ack::Sent),
            IntentStatus::PersistedLocally => return Ok(Ack::Queued),
            from => {
                return Err(TransitionError::Invalid {
                    id,
                    from,
                    to: IntentStatus::Dispatched,
                }
                .into())
            }
        }
        let page_url = Some(intent.page_url.clone()).filter(|p| !p.is_empty());
        let command =
            EngineCommand::download(intent.target_url(), intent.file_name.clone(), page_url);

        match self.engine.send(&command) {
            Ok(()) => {
                reg.mark_dispatched(id)?;
                tracing::info!(intent = %id, kind = command.kind(), "command sent to engine");
                Ok(Ack::Sent)
            }
            Err(e) => {
                self.persist(Some(id), &command, &e).await?;
                reg.mark_persisted(id)?;
                Ok(Ack::Queued)
            }
        }
    }

    /// Sends a command that belongs to no intent, or stores it when the
    /// engine cannot take it.
    pub async fn deliver(&self, command: EngineCommand) -> Result<Ack, DispatchError> {
        let _replay = self.replay_lock.lock().await;
        match self.engine.send(&command) {
            Ok(()) => {
                tracing::info!(kind = command.kind(), "command sent to engine");
                Ok(Ack::Sent)
            }
            Err(e) => {
                self.persist(None, &command, &e).await?;
                Ok(Ack::Queued)
            }
        }
    }

    async fn persist(
        &self,
        intent: Option<IntentId>,
        command: &EngineCommand,
        reason: &EngineError,
    ) -> Result<(), DispatchError> {
        let pending_id = self
            .store
            .push(intent, command)
            .await
            .map_err(DispatchError::Store)?;
        tracing::info!(
            intent = ?intent.map(|i| i.0),
            pending_id,
            kind = command.kind(),
            reason = %reason,
            "engine unavailable; command queued"
        );
        Ok(())
    }

    /// Sends every stored command in FIFO order. The batch is cleared only
    /// after all of it was handed off; a failed send keeps the whole batch.
    pub async fn replay_pending(&self) -> Result<ReplayOutcome, DispatchError> {
        let _guard = self.replay_lock.lock().await;
        let batch = self.store.list().await.map_err(DispatchError::Store)?;
        let Some(last) = batch.last() else {
            return Ok(ReplayOutcome::default());
        };

        for (sent, item) in batch.iter().enumerate() {
            if let Err(e) = self.engine.send(&item.command.as_replay()) {
                tracing::warn!(
                    pending_id = item.id,
                    sent,
                    total = batch.len(),
                    error = %e,
                    "replay interrupted; pending batch kept"
                );
                return Ok(ReplayOutcome {
                    sent,
                    interrupted: true,
                });
            }
        }

        self.store
            .clear_through(last.id)
            .await
            .map_err(DispatchError::Store)?;

        let mut reg = self.registry.lock().await;
        for id in batch.iter().filter_map(|item| item.intent_id) {
            if let Err(e) = reg.mark_dispatched(id) {
                // Intents from a previous process are gone; the command still went out.
                tracing::debug!(intent = %id, error = %e, "replayed intent not tracked");
            }
        }
        tracing::info!(count = batch.len(), "pending commands replayed");
        Ok(ReplayOutcome {
            sent: batch.len(),
            interrupted: false,
        })
    }

    /// Replays the store each time the engine reports Connected.
    pub fn spawn_replay_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        let mut status_rx = self.engine.subscribe();
        tokio::spawn(async move {
            loop {
                let connected = status_rx.borrow_and_update().state == EngineState::Connected;
                if connected {
                    if let Err(e) = dispatcher.replay_pending().await {
                        tracing::error!(error = %e, "replay of pending commands failed");
                    }
                }
                if status_rx.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::FakeEngine;
    use crate::intent::{IntentMetadata, RelationPolicy};
    use std::time::Duration;

    struct Fixture {
        engine: Arc<FakeEngine>,
        registry: Arc<Mutex<SessionRegistry>>,
        dispatcher: Arc<Dispatcher>,
    }

    async fn fixture(state: EngineState) -> Fixture {
        let engine = FakeEngine::new(state);
        let registry = Arc::new(Mutex::new(SessionRegistry::new(
            RelationPolicy::default(),
            Duration::from_secs(300),
        )));
        let store = PendingDb::open_in_memory().await.unwrap();
        let dispatcher = Arc::new(Dispatcher::new(engine.clone(), store, Arc::clone(&registry)));
        Fixture {
            engine,
            registry,
            dispatcher,
        }
    }

    async fn resolved(f: &Fixture, url: &str) -> IntentId {
        let mut reg = f.registry.lock().await;
        let id = reg.register(
            url,
            IntentMetadata {
                page_url: Some("https://host.example/page".into()),
                ..IntentMetadata::default()
            },
        );
        reg.mark_resolved(id, url, Some("file.zip".into())).unwrap();
        id
    }

    async fn status(f: &Fixture, id: IntentId) -> IntentStatus {
        f.registry.lock().await.get(id).unwrap().status
    }

    fn urls(commands: &[EngineCommand]) -> Vec<(String, bool)> {
        commands
            .iter()
            .map(|c| match c {
                EngineCommand::Download {
                    url, from_pending, ..
                } => (url.clone(), *from_pending),
                other => panic!("unexpected command {other:?}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn connected_engine_gets_command_immediately() {
        let f = fixture(EngineState::Connected).await;
        let id = resolved(&f, "https://host.example/a.zip").await;

        assert_eq!(f.dispatcher.dispatch(id).await.unwrap(), Ack::Sent);
        assert_eq!(status(&f, id).await, IntentStatus::Dispatched);
        let sent = f.engine.sent();
        assert_eq!(sent.len(), 1);
        let EngineCommand::Download {
            file_name,
            page_url,
            should_open_app,
            ..
        } = &sent[0]
        else {
            panic!("expected download");
        };
        assert_eq!(file_name.as_deref(), Some("file.zip"));
        assert_eq!(page_url.as_deref(), Some("https://host.example/page"));
        assert!(*should_open_app);
    }

    #[tokio::test]
    async fn disconnected_engine_persists_then_replays_fifo() {
        let f = fixture(EngineState::Disconnected).await;
        let a = resolved(&f, "https://host.example/a.zip").await;
        let b = resolved(&f, "https://host.example/b.zip").await;
        let c = resolved(&f, "https://host.example/c.zip").await;

        for id in [a, b, c] {
            assert_eq!(f.dispatcher.dispatch(id).await.unwrap(), Ack::Queued);
            assert_eq!(status(&f, id).await, IntentStatus::PersistedLocally);
        }
        assert!(f.engine.sent().is_empty());
        assert_eq!(f.dispatcher.store().count().await.unwrap(), 3);

        f.engine.set_state(EngineState::Connected);
        let outcome = f.dispatcher.replay_pending().await.unwrap();
        assert_eq!(outcome, ReplayOutcome { sent: 3, interrupted: false });
        assert_eq!(
            urls(&f.engine.sent()),
            vec![
                ("https://host.example/a.zip".to_string(), true),
                ("https://host.example/b.zip".to_string(), true),
                ("https://host.example/c.zip".to_string(), true),
            ]
        );
        assert_eq!(f.dispatcher.store().count().await.unwrap(), 0);
        for id in [a, b, c] {
            assert_eq!(status(&f, id).await, IntentStatus::Dispatched);
        }
    }

    #[tokio::test]
    async fn interrupted_replay_keeps_batch() {
        let f = fixture(EngineState::Disconnected).await;
        for name in ["a", "b", "c"] {
            let id = resolved(&f, &format!("https://host.example/{name}.zip")).await;
            f.dispatcher.dispatch(id).await.unwrap();
        }

        f.engine.set_state(EngineState::Connected);
        f.engine.fail_sends_after(1);
        let outcome = f.dispatcher.replay_pending().await.unwrap();
        assert_eq!(outcome, ReplayOutcome { sent: 1, interrupted: true });
        assert_eq!(f.dispatcher.store().count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn pending_intent_cannot_be_dispatched() {
        let f = fixture(EngineState::Connected).await;
        let id = f
            .registry
            .lock()
            .await
            .register("https://host.example/go", IntentMetadata::default());
        let err = f.dispatcher.dispatch(id).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Transition(TransitionError::Invalid { .. })
        ));
        assert_eq!(status(&f, id).await, IntentStatus::Pending);
        assert!(f.engine.sent().is_empty());
    }

    #[tokio::test]
    async fn concurrent_dispatch_sends_once() {
        let f = fixture(EngineState::Connected).await;
        let id = resolved(&f, "https://host.example/pkg.zip").await;

        let (a, b) = tokio::join!(f.dispatcher.dispatch(id), f.dispatcher.dispatch(id));
        assert_eq!(a.unwrap(), Ack::Sent);
        assert_eq!(b.unwrap(), Ack::Sent);
        assert_eq!(f.engine.sent().len(), 1);
        assert_eq!(status(&f, id).await, IntentStatus::Dispatched);
    }

    #[tokio::test]
    async fn queued_intent_reports_queued_again() {
        let f = fixture(EngineState::Disconnected).await;
        let id = resolved(&f, "https://host.example/pkg.zip").await;

        assert_eq!(f.dispatcher.dispatch(id).await.unwrap(), Ack::Queued);
        assert_eq!(f.dispatcher.dispatch(id).await.unwrap(), Ack::Queued);
        assert_eq!(f.dispatcher.store().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn command_stored_while_engine_connects_is_replayed() {
        let f = fixture(EngineState::Disconnected).await;
        f.engine.connect_on_failed_send();
        let handle = f.dispatcher.spawn_replay_loop();

        for n in 0..20 {
            f.engine.set_state(EngineState::Disconnected);
            tokio::task::yield_now().await;
            let id = resolved(&f, &format!("https://host.example/{n}.zip")).await;
            assert_eq!(f.dispatcher.dispatch(id).await.unwrap(), Ack::Queued);
            assert_eq!(f.engine.state(), EngineState::Connected);

            let drained = tokio::time::timeout(Duration::from_secs(5), async {
                while f.dispatcher.store().count().await.unwrap() != 0
                    || status(&f, id).await != IntentStatus::Dispatched
                {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await;
            assert!(drained.is_ok(), "command {n} left in the store while connected");
        }
        assert_eq!(f.engine.sent().len(), 20);
        handle.abort();
    }

    #[tokio::test]
    async fn replay_loop_drains_on_connect() {
        let f = fixture(EngineState::Disconnected).await;
        let id = resolved(&f, "https://host.example/a.zip").await;
        f.dispatcher.dispatch(id).await.unwrap();
        let handle = f.dispatcher.spawn_replay_loop();

        f.engine.set_state(EngineState::Connecting);
        f.engine.set_state(EngineState::Connected);

        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if f.dispatcher.store().count().await.unwrap() == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(drained.is_ok(), "pending store was not drained");
        assert_eq!(status(&f, id).await, IntentStatus::Dispatched);
        handle.abort();
    }
}
