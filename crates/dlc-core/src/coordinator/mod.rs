//! Coordinator: owns the registry, dispatcher, quality proxy and engine
//! handle, and turns inbound messages into state changes and replies.
//!
//! There are no globals; tests build as many coordinators as they need.

mod handlers;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::DlcConfig;
use crate::dispatcher::Dispatcher;
use crate::engine::Engine;
use crate::fetch_head::{CurlProber, HeadProber};
use crate::intent::SessionRegistry;
use crate::pending_db::PendingDb;
use crate::quality::QualityProxy;
use crate::retry::RetryPolicy;
use crate::transport::{self, MessageHandler, Reply};

pub struct Coordinator {
    registry: Arc<Mutex<SessionRegistry>>,
    engine: Arc<dyn Engine>,
    dispatcher: Arc<Dispatcher>,
    quality: QualityProxy,
    prober: Option<Arc<dyn HeadProber>>,
    duplicate_window: Duration,
    completed_retention: Duration,
    eviction_interval: Duration,
}

impl Coordinator {
    /// Builds a coordinator from config. The HEAD prober is created only when
    /// `[probe] enabled = true`.
    pub fn new(config: &DlcConfig, engine: Arc<dyn Engine>, store: PendingDb) -> Self {
        let registry = Arc::new(Mutex::new(SessionRegistry::new(
            config.relation,
            config.intent_ttl(),
        )));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&engine),
            store,
            Arc::clone(&registry),
        ));
        let quality = QualityProxy::new(
            Arc::clone(&engine),
            RetryPolicy::from_config(&config.quality()),
        );
        let probe = config.probe();
        let prober: Option<Arc<dyn HeadProber>> = probe.enabled.then(|| {
            Arc::new(CurlProber::new(Duration::from_secs(probe.timeout_secs))) as Arc<dyn HeadProber>
        });

        Self {
            registry,
            engine,
            dispatcher,
            quality,
            prober,
            duplicate_window: config.duplicate_window(),
            completed_retention: config.completed_retention(),
            eviction_interval: config.eviction_interval(),
        }
    }

    /// Replaces the HEAD prober (`None` disables probing).
    pub fn with_prober(mut self, prober: Option<Arc<dyn HeadProber>>) -> Self {
        self.prober = prober;
        self
    }

    pub fn registry(&self) -> &Arc<Mutex<SessionRegistry>> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub async fn active_intents(&self) -> usize {
        self.registry.lock().await.active_count()
    }

    /// Decodes one text frame and handles it. Always yields a reply.
    pub async fn handle_frame(&self, text: &str) -> Reply {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                let err = transport::ProtocolError::InvalidJson(e.to_string());
                tracing::debug!(error = %err, "rejected inbound frame");
                return Reply::error(err);
            }
        };
        let request_id = transport::request_id(&value);
        let reply = match transport::decode(&value) {
            Ok(msg) => {
                tracing::debug!(kind = msg.kind(), "inbound message");
                self.handle(msg).await
            }
            Err(err) => {
                tracing::debug!(error = %err, "rejected inbound message");
                Reply::error(err)
            }
        };
        reply.with_request_id(request_id)
    }

    /// Starts the replay loop and the periodic eviction sweep.
    pub fn spawn_background(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        vec![self.dispatcher.spawn_replay_loop(), self.spawn_eviction_loop()]
    }

    fn spawn_eviction_loop(&self) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let every = self.eviction_interval;
        let retention = self.completed_retention;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let mut reg = registry.lock().await;
                let expired = reg.evict_expired(now);
                let pruned = reg.prune_completed(now, retention);
                if expired + pruned > 0 {
                    tracing::debug!(expired, pruned, remaining = reg.len(), "registry sweep");
                }
            }
        })
    }
}

#[async_trait]
impl MessageHandler for Coordinator {
    async fn handle_text(&self, text: &str) -> String {
        self.handle_frame(text).await.to_text()
    }

    /// Quality extraction can take several engine round trips and never
    /// touches the registry.
    fn answers_out_of_order(&self, text: &str) -> bool {
        serde_json::from_str::<serde_json::Value>(text)
            .ok()
            .and_then(|v| transport::decode(&v).ok())
            .is_some_and(|msg| matches!(msg, transport::InboundMessage::ExtractQualities { .. }))
    }
}
