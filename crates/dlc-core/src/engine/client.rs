//! WebSocket engine client with a single reconnect loop.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::wire::{EngineCommand, QualitiesReply};
use super::{Engine, EngineError, EngineState, EngineStatus};
use crate::config::DlcConfig;

type ReplySlot = Mutex<Option<oneshot::Sender<QualitiesReply>>>;

/// Connection parameters for [`EngineClient::spawn`].
#[derive(Debug, Clone)]
pub struct EngineClientOptions {
    pub url: String,
    pub connect_timeout: Duration,
    pub reconnect_delay: Duration,
    pub request_timeout: Duration,
}

impl EngineClientOptions {
    pub fn from_config(cfg: &DlcConfig) -> Self {
        let engine = cfg.engine();
        Self {
            url: cfg.engine_url.clone(),
            connect_timeout: Duration::from_secs(engine.connect_timeout_secs),
            reconnect_delay: Duration::from_secs(engine.reconnect_delay_secs),
            request_timeout: Duration::from_secs(engine.request_timeout_secs),
        }
    }
}

/// State shared between the handle and the connection task.
struct Shared {
    status_tx: watch::Sender<EngineStatus>,
    reply_slot: ReplySlot,
    reconnect: Notify,
}

impl Shared {
    fn publish(&self, state: EngineState, last_error: Option<String>) {
        self.status_tx.send_replace(EngineStatus { state, last_error });
    }

    /// Drops any outstanding quality request so its caller sees `Closed`.
    fn fail_outstanding(&self) {
        let mut slot = self.reply_slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.take();
    }

    fn deliver(&self, reply: QualitiesReply) {
        let waiter = self
            .reply_slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match waiter {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => tracing::debug!("qualities reply with no outstanding request dropped"),
        }
    }
}

/// Handle to the engine connection. Cheap to share behind an `Arc`.
pub struct EngineClient {
    shared: Arc<Shared>,
    frames_tx: mpsc::UnboundedSender<String>,
    request_lock: tokio::sync::Mutex<()>,
    shutdown_tx: watch::Sender<bool>,
    request_timeout: Duration,
}

enum SessionEnd {
    /// Engine closed with a normal close code; wait for a nudge before reconnecting.
    Deliberate,
    Lost(String),
    Shutdown,
}

impl EngineClient {
    /// Starts the connection task. The first attempt is made immediately.
    pub fn spawn(opts: EngineClientOptions) -> (Arc<Self>, tokio::task::JoinHandle<()>) {
        let (status_tx, _) = watch::channel(EngineStatus::default());
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            status_tx,
            reply_slot: Mutex::new(None),
            reconnect: Notify::new(),
        });

        let client = Arc::new(EngineClient {
            shared: Arc::clone(&shared),
            frames_tx,
            request_lock: tokio::sync::Mutex::new(()),
            shutdown_tx,
            request_timeout: opts.request_timeout,
        });

        let handle = tokio::spawn(connection_loop(shared, opts, frames_rx, shutdown_rx));
        (client, handle)
    }

    /// Closes the connection and stops reconnecting.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[async_trait]
impl Engine for EngineClient {
    fn status(&self) -> EngineStatus {
        self.shared.status_tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.shared.status_tx.subscribe()
    }

    fn send(&self, command: &EngineCommand) -> Result<(), EngineError> {
        if self.state() != EngineState::Connected {
            return Err(EngineError::Unavailable);
        }
        let frame = command
            .to_frame()
            .map_err(|e| EngineError::Encode(e.to_string()))?;
        self.frames_tx.send(frame).map_err(|_| EngineError::Closed)?;
        tracing::debug!(kind = command.kind(), "engine command queued");
        Ok(())
    }

    async fn request_qualities(&self, url: &str) -> Result<QualitiesReply, EngineError> {
        // One request in flight: the engine reply carries no correlation id.
        let _guard = self.request_lock.lock().await;

        let (tx, rx) = oneshot::channel();
        *self
            .shared
            .reply_slot
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(tx);

        if let Err(e) = self.send(&EngineCommand::ExtractQualities {
            url: url.to_string(),
        }) {
            self.shared.fail_outstanding();
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(EngineError::Closed),
            Err(_) => {
                self.shared.fail_outstanding();
                Err(EngineError::Timeout(self.request_timeout))
            }
        }
    }

    fn request_reconnect(&self) {
        self.shared.reconnect.notify_one();
    }
}

async fn connection_loop(
    shared: Arc<Shared>,
    opts: EngineClientOptions,
    mut frames_rx: mpsc::UnboundedReceiver<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        shared.publish(EngineState::Connecting, None);
        tracing::debug!(url = %opts.url, "connecting to engine");
        let attempt =
            tokio::time::timeout(opts.connect_timeout, tokio_tungstenite::connect_async(opts.url.as_str()))
                .await;

        let end = match attempt {
            Ok(Ok((ws, _response))) => {
                shared.publish(EngineState::Connected, None);
                tracing::info!(url = %opts.url, "engine connected");
                run_session(ws, &shared, &mut frames_rx, &mut shutdown_rx).await
            }
            Ok(Err(e)) => SessionEnd::Lost(format!("connect: {e}")),
            Err(_) => SessionEnd::Lost(format!(
                "connect timed out after {:?}",
                opts.connect_timeout
            )),
        };

        shared.fail_outstanding();
        match end {
            SessionEnd::Shutdown => {
                shared.publish(EngineState::Disconnected, None);
                break;
            }
            SessionEnd::Deliberate => {
                tracing::info!("engine closed the connection normally; waiting for reconnect request");
                shared.publish(EngineState::Disconnected, Some("closed by engine".to_string()));
                tokio::select! {
                    _ = shared.reconnect.notified() => {}
                    _ = shutdown_rx.changed() => break,
                }
            }
            SessionEnd::Lost(err) => {
                tracing::warn!(error = %err, delay = ?opts.reconnect_delay, "engine disconnected; will retry");
                shared.publish(EngineState::Disconnected, Some(err));
                tokio::select! {
                    _ = tokio::time::sleep(opts.reconnect_delay) => {}
                    _ = shared.reconnect.notified() => {
                        tracing::debug!("reconnect requested; skipping backoff");
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        }
    }
    shared.publish(EngineState::Disconnected, None);
    tracing::debug!("engine connection loop stopped");
}

async fn run_session(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    shared: &Shared,
    frames_rx: &mut mpsc::UnboundedReceiver<String>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            frame = frames_rx.recv() => match frame {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        return SessionEnd::Lost(format!("send: {e}"));
                    }
                }
                None => return SessionEnd::Shutdown,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_incoming(shared, text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    let normal = frame.as_ref().is_some_and(|f| f.code == CloseCode::Normal);
                    return if normal {
                        SessionEnd::Deliberate
                    } else {
                        SessionEnd::Lost("closed by engine".to_string())
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Lost(format!("receive: {e}")),
                None => return SessionEnd::Lost("connection reset".to_string()),
            },
            _ = shutdown_rx.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                return SessionEnd::Shutdown;
            }
        }
    }
}

fn handle_incoming(shared: &Shared, text: &str) {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "non-JSON engine frame ignored");
            return;
        }
    };
    if let Some(reply) = QualitiesReply::from_frame(&value) {
        tracing::debug!(
            success = reply.success,
            count = reply.qualities.len(),
            "qualities reply received"
        );
        shared.deliver(reply);
        return;
    }
    let kind = value.get("type").and_then(|t| t.as_str()).unwrap_or("?");
    tracing::debug!(kind, "engine frame ignored");
}
