//! One-shot WebSocket client for talking to a running coordinator.

use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends one JSON message to the coordinator at `addr` and returns its reply.
pub async fn request(addr: &str, msg: &Value) -> Result<Value> {
    let url = format!("ws://{}", addr);
    let (mut ws, _) = tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(url.as_str()))
        .await
        .with_context(|| format!("connect to coordinator at {url}: timed out"))?
        .with_context(|| format!("connect to coordinator at {url} (is `dlc serve` running?)"))?;

    ws.send(Message::Text(msg.to_string().into())).await?;

    let reply = tokio::time::timeout(REPLY_TIMEOUT, async {
        while let Some(frame) = ws.next().await {
            if let Message::Text(text) = frame? {
                let value: Value = serde_json::from_str(text.as_str()).context("decode reply")?;
                return Ok(Some(value));
            }
        }
        Ok::<_, anyhow::Error>(None)
    })
    .await
    .context("coordinator did not reply in time")??;

    let _ = ws.close(None).await;
    match reply {
        Some(value) => Ok(value),
        None => bail!("coordinator closed the connection without replying"),
    }
}

/// Error text of a failed reply, if it failed.
pub fn reply_error(reply: &Value) -> Option<String> {
    if reply["success"].as_bool() == Some(true) {
        return None;
    }
    Some(
        reply["error"]
            .as_str()
            .unwrap_or("request failed")
            .to_string(),
    )
}
