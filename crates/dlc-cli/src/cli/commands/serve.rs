//! `dlc serve` – run the coordinator until interrupted.

use anyhow::{Context, Result};
use dlc_core::config::DlcConfig;
use dlc_core::coordinator::Coordinator;
use dlc_core::engine::{EngineClient, EngineClientOptions};
use dlc_core::pending_db::PendingDb;
use dlc_core::transport;
use std::sync::Arc;

pub async fn run_serve(cfg: &DlcConfig) -> Result<()> {
    let store = PendingDb::open_default().await?;
    let waiting = store.count().await?;
    if waiting > 0 {
        tracing::info!("{} pending command(s) from a previous run", waiting);
    }

    let (engine, engine_task) = EngineClient::spawn(EngineClientOptions::from_config(cfg));
    let coordinator = Arc::new(Coordinator::new(cfg, engine.clone(), store));
    let background = coordinator.spawn_background();

    let listener = transport::bind(&cfg.listen_addr).await?;
    let listener_task = transport::spawn_listener(listener, Arc::clone(&coordinator));
    println!(
        "dlc listening on ws://{} (engine {})",
        cfg.listen_addr, cfg.engine_url
    );

    tokio::signal::ctrl_c()
        .await
        .context("wait for shutdown signal")?;
    tracing::info!("shutting down");

    listener_task.abort();
    for handle in background {
        handle.abort();
    }
    engine.shutdown();
    let _ = engine_task.await;
    Ok(())
}
