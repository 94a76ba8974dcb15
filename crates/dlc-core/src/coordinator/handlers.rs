//! Per-message handling.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use super::Coordinator;
use crate::dispatcher::{Ack, DispatchError, Dispatcher};
use crate::engine::{epoch_millis, EngineCommand, EngineState};
use crate::fetch_head::{probe_or_fallback, HeadProber};
use crate::intent::{IntentId, IntentMetadata, IntentStatus, SessionRegistry, SourceEvent};
use crate::quality::{format_selector_for_resolution, AUDIO_ONLY_SELECTOR};
use crate::resolver::{self, FinalUrlEvent, Observation, Resolution};
use crate::transport::{DownloadRequest, InboundMessage, Reply, YoutubeRequest};
use crate::url_model::is_local_url;

fn dispatched(id: IntentId, ack: Ack) -> Reply {
    Reply::ok()
        .with("intentId", id.0)
        .with("status", ack.as_str())
}

fn dispatch_failed(err: DispatchError) -> Reply {
    tracing::error!(error = %err, "dispatch failed");
    Reply::error(err)
}

impl Coordinator {
    pub async fn handle(&self, msg: InboundMessage) -> Reply {
        match msg {
            InboundMessage::Download(req) => self.on_download(req).await,
            InboundMessage::LinkResolved {
                original_url,
                final_url,
                file_name,
                page_url,
            } => {
                let event = FinalUrlEvent {
                    original_url: Some(original_url),
                    final_url,
                    file_name,
                    page_url,
                    source_event: SourceEvent::LinkClick,
                };
                self.on_final_url(event).await
            }
            InboundMessage::NativeDownload {
                url,
                final_url,
                file_name,
                page_url,
            } => self.on_native_download(url, final_url, file_name, page_url).await,
            InboundMessage::ExtractQualities { url } => self.on_extract_qualities(&url).await,
            InboundMessage::YoutubeDownload(req) => self.on_youtube_download(req).await,
            InboundMessage::OpenApp => self.on_open_app(),
            InboundMessage::ConnectionCheck { reconnect } => self.on_connection_check(reconnect),
            InboundMessage::Ping => Reply::ok().with("type", "pong"),
        }
    }

    async fn on_download(&self, req: DownloadRequest) -> Reply {
        let meta = IntentMetadata {
            file_name: req.file_name,
            page_url: req.page_url,
            source_event: req.source_event,
        };
        let observed = {
            let mut reg = self.registry.lock().await;
            resolver::observe(&mut reg, &req.url, meta)
        };
        match observed {
            Ok(Observation::Resolved(id)) => match self.dispatcher.dispatch(id).await {
                Ok(ack) => dispatched(id, ack),
                Err(e) => dispatch_failed(e),
            },
            Ok(Observation::Pending(id)) => {
                if let Some(prober) = &self.prober {
                    tokio::spawn(probe_and_dispatch(
                        Arc::clone(&self.registry),
                        Arc::clone(&self.dispatcher),
                        Arc::clone(prober),
                        id,
                        req.url,
                    ));
                }
                Reply::ok().with("intentId", id.0).with("status", "pending")
            }
            Err(e) => {
                tracing::error!(error = %e, url = %req.url, "registration failed");
                Reply::error(e)
            }
        }
    }

    async fn on_final_url(&self, event: FinalUrlEvent) -> Reply {
        let resolution = {
            let mut reg = self.registry.lock().await;
            resolver::resolve_final(&mut reg, event)
        };
        let resolution = match resolution {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "final URL not applied");
                return Reply::error(e);
            }
        };
        let id = resolution.id();
        match self.dispatcher.dispatch(id).await {
            Ok(ack) => dispatched(id, ack).with("resolved", matches!(resolution, Resolution::Merged(_))),
            Err(e) => dispatch_failed(e),
        }
    }

    async fn on_native_download(
        &self,
        url: String,
        final_url: Option<String>,
        file_name: Option<String>,
        page_url: Option<String>,
    ) -> Reply {
        let target = final_url.unwrap_or_else(|| url.clone());
        if is_local_url(&url) || is_local_url(&target) {
            tracing::debug!(url = %target, "local download left to the browser");
            return Reply::ok().with("skipped", true).with("reason", "local");
        }

        {
            let reg = self.registry.lock().await;
            if let Some(id) = reg.recently_dispatched(&target, Instant::now(), self.duplicate_window) {
                tracing::debug!(intent = %id, url = %target, "duplicate download event dropped");
                return Reply::ok()
                    .with("skipped", true)
                    .with("reason", "duplicate")
                    .with("intentId", id.0);
            }
        }

        let original_url = (url != target).then_some(url);
        self.on_final_url(FinalUrlEvent {
            original_url,
            final_url: target,
            file_name,
            page_url,
            source_event: SourceEvent::NativeDownloadEvent,
        })
        .await
    }

    async fn on_extract_qualities(&self, url: &str) -> Reply {
        match self.quality.extract_qualities(url).await {
            Ok(report) => {
                let qualities = serde_json::to_value(&report.qualities)
                    .unwrap_or_else(|_| serde_json::Value::Array(Vec::new()));
                Reply::ok()
                    .with("qualities", qualities)
                    .with("fallback", report.fallback)
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "quality extraction failed");
                Reply::error(e)
            }
        }
    }

    async fn on_youtube_download(&self, req: YoutubeRequest) -> Reply {
        let quality = match (req.quality, req.audio_only) {
            (Some(q), _) => q,
            (None, true) => AUDIO_ONLY_SELECTOR.to_string(),
            (None, false) => format_selector_for_resolution(req.resolution.as_deref()).to_string(),
        };
        let command = EngineCommand::YoutubeDownload {
            url: req.url,
            file_name: req.file_name,
            quality,
            audio_only: req.audio_only,
            page_url: req.page_url,
            timestamp: epoch_millis(),
            from_pending: false,
        };
        match self.dispatcher.deliver(command).await {
            Ok(ack) => Reply::ok().with("status", ack.as_str()),
            Err(e) => dispatch_failed(e),
        }
    }

    /// Not persisted: opening the app later would surprise the user.
    fn on_open_app(&self) -> Reply {
        match self.engine.send(&EngineCommand::open_app()) {
            Ok(()) => Reply::ok(),
            Err(e) => Reply::error(e),
        }
    }

    fn on_connection_check(&self, reconnect: bool) -> Reply {
        let status = self.engine.status();
        if reconnect && status.state != EngineState::Connected {
            self.engine.request_reconnect();
        }
        let mut reply = Reply::ok()
            .with("connected", status.state == EngineState::Connected)
            .with("status", status.state.as_str());
        if let Some(err) = status.last_error {
            reply = reply.with("lastError", err);
        }
        reply
    }
}

/// Resolves a Pending intent through a HEAD probe, then dispatches it.
/// Skipped when another event resolved the intent while the probe ran.
async fn probe_and_dispatch(
    registry: Arc<Mutex<SessionRegistry>>,
    dispatcher: Arc<Dispatcher>,
    prober: Arc<dyn HeadProber>,
    id: IntentId,
    url: String,
) {
    let probe = probe_or_fallback(prober, url.clone()).await;
    let file_name = probe.file_name();
    let resolution = {
        let mut reg = registry.lock().await;
        if reg.get(id).map(|i| i.status) != Some(IntentStatus::Pending) {
            tracing::debug!(intent = %id, "intent no longer pending; probe result dropped");
            return;
        }
        resolver::resolve_final(
            &mut reg,
            FinalUrlEvent {
                original_url: Some(url),
                final_url: probe.final_url,
                file_name,
                page_url: None,
                source_event: SourceEvent::FetchResponse,
            },
        )
    };
    match resolution {
        Ok(resolution) => {
            if let Err(e) = dispatcher.dispatch(resolution.id()).await {
                tracing::error!(intent = %id, error = %e, "dispatch after probe failed");
            }
        }
        Err(e) => tracing::error!(intent = %id, error = %e, "probe result not applied"),
    }
}
