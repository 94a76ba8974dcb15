//! Queue operations: push, list, clear.

use anyhow::{Context, Result};
use sqlx::Row;

use super::db::{unix_timestamp, PendingDb};
use super::{PendingEngineCommand, PendingId};
use crate::engine::EngineCommand;
use crate::intent::IntentId;

impl PendingDb {
    /// Append a command to the queue and return its id.
    pub async fn push(
        &self,
        intent_id: Option<IntentId>,
        command: &EngineCommand,
    ) -> Result<PendingId> {
        let json = serde_json::to_string(command)?;
        let row_id = sqlx::query(
            r#"
            INSERT INTO pending_commands (intent_id, command_json, enqueued_at)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(intent_id.map(|id| id.0 as i64))
        .bind(json)
        .bind(unix_timestamp())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        tracing::debug!(pending_id = row_id, kind = command.kind(), "command persisted");
        Ok(row_id)
    }

    /// All queued commands, oldest first.
    pub async fn list(&self) -> Result<Vec<PendingEngineCommand>> {
        let rows = sqlx::query(
            r#"
            SELECT id, intent_id, command_json, enqueued_at
            FROM pending_commands
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            let intent_id: Option<i64> = row.get("intent_id");
            let json: String = row.get("command_json");
            let enqueued_at: i64 = row.get("enqueued_at");
            let command: EngineCommand = serde_json::from_str(&json)
                .with_context(|| format!("decode pending command {id}"))?;
            out.push(PendingEngineCommand {
                id,
                intent_id: intent_id.map(|i| IntentId(i as u64)),
                command,
                enqueued_at,
            });
        }
        Ok(out)
    }

    /// Delete every record with id ≤ `last_id`. Returns the number removed.
    pub async fn clear_through(&self, last_id: PendingId) -> Result<u64> {
        let res = sqlx::query("DELETE FROM pending_commands WHERE id <= ?1")
            .bind(last_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    pub async fn clear_all(&self) -> Result<u64> {
        let res = sqlx::query("DELETE FROM pending_commands")
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM pending_commands")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}
