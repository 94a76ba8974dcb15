//! `dlc check` – report the engine connection state of a running coordinator.

use anyhow::{bail, Result};
use serde_json::json;

use crate::cli::client;

pub async fn run_check(addr: &str, reconnect: bool) -> Result<()> {
    let kind = if reconnect {
        "test_connection"
    } else {
        "connection_check"
    };
    let reply = client::request(addr, &json!({ "type": kind })).await?;
    if let Some(err) = client::reply_error(&reply) {
        bail!("coordinator: {}", err);
    }

    let status = reply["status"].as_str().unwrap_or("unknown");
    println!("engine: {}", status);
    if let Some(err) = reply["lastError"].as_str() {
        println!("last error: {}", err);
    }
    if reconnect && reply["connected"] != true {
        println!("reconnect requested");
    }
    Ok(())
}
