//! Minimal download engine for integration tests: a WebSocket server that
//! records every frame, answers quality requests from a script, and sends an
//! unsolicited `downloadAccepted` after each download command. Tests can end
//! open sessions abruptly or with a normal close.

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone, Copy)]
enum SessionControl {
    /// Drop the TCP stream without a close handshake.
    Drop,
    /// Close with code 1000.
    CloseNormal,
}

#[derive(Clone)]
pub struct FakeEngineServer {
    pub url: String,
    received: Arc<Mutex<Vec<Value>>>,
    quality_replies: Arc<Mutex<VecDeque<Value>>>,
    connections: Arc<AtomicUsize>,
    control: broadcast::Sender<SessionControl>,
}

/// Reserves a free local port and returns its address; nothing listens on it afterwards.
pub fn free_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().unwrap()
}

impl FakeEngineServer {
    pub async fn start() -> Self {
        Self::start_at("127.0.0.1:0".parse().unwrap()).await
    }

    pub async fn start_at(addr: SocketAddr) -> Self {
        let listener = TcpListener::bind(addr).await.expect("bind fake engine");
        let addr = listener.local_addr().unwrap();
        let server = FakeEngineServer {
            url: format!("ws://{}", addr),
            received: Arc::new(Mutex::new(Vec::new())),
            quality_replies: Arc::new(Mutex::new(VecDeque::new())),
            connections: Arc::new(AtomicUsize::new(0)),
            control: broadcast::channel(8).0,
        };
        let handle = server.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handle = handle.clone();
                tokio::spawn(async move { handle.serve(stream).await });
            }
        });
        server
    }

    async fn serve(&self, stream: tokio::net::TcpStream) {
        let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };
        let mut control = self.control.subscribe();
        self.connections.fetch_add(1, Ordering::SeqCst);
        loop {
            let msg = tokio::select! {
                msg = ws.next() => match msg {
                    Some(Ok(msg)) => msg,
                    _ => return,
                },
                ctl = control.recv() => match ctl {
                    Ok(SessionControl::Drop) => return,
                    Ok(SessionControl::CloseNormal) => {
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: "engine shutting down".into(),
                        };
                        let _ = ws.close(Some(frame)).await;
                        while let Some(Ok(_)) = ws.next().await {}
                        return;
                    }
                    Err(_) => continue,
                },
            };
            let Message::Text(text) = msg else {
                continue;
            };
            let Ok(value) = serde_json::from_str::<Value>(text.as_str()) else {
                continue;
            };
            let kind = value["type"].as_str().unwrap_or_default().to_string();
            self.received.lock().unwrap().push(value.clone());

            let answer = match kind.as_str() {
                "extractYouTubeQualities" => Some(
                    self.quality_replies
                        .lock()
                        .unwrap()
                        .pop_front()
                        .unwrap_or_else(|| json!({"success": true, "qualities": []})),
                ),
                "download" => Some(json!({"type": "downloadAccepted", "url": value["url"]})),
                _ => None,
            };
            if let Some(answer) = answer {
                if ws.send(Message::Text(answer.to_string().into())).await.is_err() {
                    return;
                }
            }
        }
    }

    /// Number of sessions accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Ends every open session without a close frame.
    pub fn drop_sessions(&self) {
        let _ = self.control.send(SessionControl::Drop);
    }

    /// Ends every open session with close code 1000.
    pub fn close_sessions_normally(&self) {
        let _ = self.control.send(SessionControl::CloseNormal);
    }

    pub fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }

    pub fn push_quality_reply(&self, reply: Value) {
        self.quality_replies.lock().unwrap().push_back(reply);
    }

    /// Waits until at least `n` frames arrived and returns them all.
    pub async fn wait_for_frames(&self, n: usize) -> Vec<Value> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let frames = self.received();
            if frames.len() >= n || tokio::time::Instant::now() >= deadline {
                return frames;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
