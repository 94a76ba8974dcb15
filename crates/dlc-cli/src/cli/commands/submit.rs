//! `dlc submit <url>` – hand a download to a running coordinator.

use anyhow::{bail, Result};
use serde_json::json;

use crate::cli::client;

pub async fn run_submit(addr: &str, url: &str, file_name: Option<String>) -> Result<()> {
    let mut msg = json!({ "type": "download", "url": url });
    if let Some(name) = file_name {
        msg["fileName"] = json!(name);
    }
    let reply = client::request(addr, &msg).await?;
    if let Some(err) = client::reply_error(&reply) {
        bail!("coordinator rejected download: {}", err);
    }
    let status = reply["status"].as_str().unwrap_or("unknown");
    match reply["intentId"].as_u64() {
        Some(id) => println!("intent {}: {}", id, status),
        None => println!("{}", status),
    }
    Ok(())
}
