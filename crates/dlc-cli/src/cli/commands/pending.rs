//! `dlc pending` / `dlc clear-pending` – inspect the persisted engine queue.

use anyhow::Result;
use dlc_core::engine::EngineCommand;
use dlc_core::pending_db::PendingDb;

fn target(command: &EngineCommand) -> &str {
    match command {
        EngineCommand::Download { url, .. }
        | EngineCommand::YoutubeDownload { url, .. }
        | EngineCommand::ExtractQualities { url } => url,
        EngineCommand::OpenApp { .. } => "-",
    }
}

pub async fn run_pending(db: &PendingDb) -> Result<()> {
    let items = db.list().await?;
    if items.is_empty() {
        println!("No pending commands.");
        return Ok(());
    }
    println!("{:<6} {:<12} {:<18} URL", "ID", "ENQUEUED", "KIND");
    for item in items {
        println!(
            "{:<6} {:<12} {:<18} {}",
            item.id,
            item.enqueued_at,
            item.command.kind(),
            target(&item.command)
        );
    }
    Ok(())
}

pub async fn run_clear_pending(db: &PendingDb) -> Result<()> {
    let removed = db.clear_all().await?;
    println!("Removed {} pending command(s).", removed);
    Ok(())
}
