//! WebSocket listener: one task per client connection. Messages on a
//! connection are handled in arrival order; long-running requests are
//! answered from their own task.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Turns one inbound text frame into exactly one reply frame.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle_text(&self, text: &str) -> String;

    /// True when `text` may be answered after later messages on the same
    /// connection. Such messages must not touch ordering-sensitive state.
    fn answers_out_of_order(&self, _text: &str) -> bool {
        false
    }
}

pub async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind listener on {addr}"))
}

/// Spawns the accept loop. Each connection gets its own task. Replies follow
/// message order except for messages the handler answers out of order
/// (clients correlate those with `requestId`).
pub fn spawn_listener<H: MessageHandler>(
    listener: TcpListener,
    handler: Arc<H>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "listening for extension connections");
        }
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let handler = Arc::clone(&handler);
                    tokio::spawn(serve_connection(stream, peer, handler));
                }
                Err(e) => tracing::debug!("listener accept: {}", e),
            }
        }
    })
}

async fn serve_connection<H: MessageHandler>(stream: TcpStream, peer: SocketAddr, handler: Arc<H>) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::debug!(%peer, "websocket handshake: {}", e);
            return;
        }
    };
    tracing::debug!(%peer, "client connected");

    let (mut sink, mut source) = ws.split();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(text) = reply_rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = source.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text.as_str().to_string(),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    let _ = reply_tx.send(r#"{"success":false,"error":"invalid JSON: binary frame is not UTF-8"}"#.to_string());
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(%peer, "websocket receive: {}", e);
                break;
            }
        };
        if handler.answers_out_of_order(&text) {
            let handler = Arc::clone(&handler);
            let reply_tx = reply_tx.clone();
            tokio::spawn(async move {
                let reply = handler.handle_text(&text).await;
                let _ = reply_tx.send(reply);
            });
        } else {
            let reply = handler.handle_text(&text).await;
            let _ = reply_tx.send(reply);
        }
    }

    drop(reply_tx);
    let _ = writer.await;
    tracing::debug!(%peer, "client disconnected");
}
