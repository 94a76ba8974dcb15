//! In-process engine double for unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use super::{Engine, EngineCommand, EngineError, EngineState, EngineStatus, QualitiesReply};

pub(crate) struct FakeEngine {
    status_tx: watch::Sender<EngineStatus>,
    sent: Mutex<Vec<EngineCommand>>,
    replies: Mutex<VecDeque<Result<QualitiesReply, EngineError>>>,
    fail_after: Mutex<Option<usize>>,
    quality_calls: AtomicU32,
    reconnects: AtomicU32,
    connect_on_failed_send: AtomicBool,
}

impl FakeEngine {
    pub(crate) fn new(state: EngineState) -> Arc<Self> {
        let (status_tx, _) = watch::channel(EngineStatus {
            state,
            last_error: None,
        });
        Arc::new(Self {
            status_tx,
            sent: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            fail_after: Mutex::new(None),
            quality_calls: AtomicU32::new(0),
            reconnects: AtomicU32::new(0),
            connect_on_failed_send: AtomicBool::new(false),
        })
    }

    pub(crate) fn set_state(&self, state: EngineState) {
        self.status_tx.send_replace(EngineStatus {
            state,
            last_error: None,
        });
    }

    pub(crate) fn sent(&self) -> Vec<EngineCommand> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn push_reply(&self, reply: Result<QualitiesReply, EngineError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Sends fail with `Closed` once `n` commands have been accepted.
    pub(crate) fn fail_sends_after(&self, n: usize) {
        *self.fail_after.lock().unwrap() = Some(n);
    }

    /// A send that fails for lack of a connection also brings the engine up,
    /// as when the connection completes while a command is being refused.
    pub(crate) fn connect_on_failed_send(&self) {
        self.connect_on_failed_send.store(true, Ordering::SeqCst);
    }

    pub(crate) fn quality_calls(&self) -> u32 {
        self.quality_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn reconnects(&self) -> u32 {
        self.reconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Engine for FakeEngine {
    fn status(&self) -> EngineStatus {
        self.status_tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.status_tx.subscribe()
    }

    fn send(&self, command: &EngineCommand) -> Result<(), EngineError> {
        if self.state() != EngineState::Connected {
            if self.connect_on_failed_send.load(Ordering::SeqCst) {
                self.set_state(EngineState::Connected);
            }
            return Err(EngineError::Unavailable);
        }
        let mut sent = self.sent.lock().unwrap();
        if let Some(n) = *self.fail_after.lock().unwrap() {
            if sent.len() >= n {
                return Err(EngineError::Closed);
            }
        }
        sent.push(command.clone());
        Ok(())
    }

    async fn request_qualities(&self, _url: &str) -> Result<QualitiesReply, EngineError> {
        self.quality_calls.fetch_add(1, Ordering::SeqCst);
        if self.state() != EngineState::Connected {
            return Err(EngineError::Unavailable);
        }
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(QualitiesReply {
                success: true,
                ..QualitiesReply::default()
            })
        })
    }

    fn request_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
    }
}
