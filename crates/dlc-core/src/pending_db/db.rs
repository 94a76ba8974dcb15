//! Connection, migrations and timestamp helpers. Queue operations live in `queue`.

use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Handle to the pending-command store.
///
/// The default file lives under the XDG state directory:
/// `~/.local/state/dlc/pending.db` on Debian.
#[derive(Clone)]
pub struct PendingDb {
    pub(crate) pool: Pool<Sqlite>,
}

impl PendingDb {
    /// Default location of the store.
    pub fn default_path() -> Result<PathBuf> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("dlc")?;
        Ok(xdg_dirs.get_state_home().join("dlc").join("pending.db"))
    }

    /// Open (or create) the default store and run migrations.
    pub async fn open_default() -> Result<Self> {
        let path = Self::default_path()?;
        Self::open_at(&path)
            .await
            .with_context(|| format!("open pending store: {}", path.display()))
    }

    /// Open (or create) the store at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&uri)
            .await?;
        let db = PendingDb { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// In-memory store (no disk I/O). A single pooled connection that never
    /// recycles, so the database lives as long as the handle.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let db = PendingDb { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        // AUTOINCREMENT keeps ids monotonic across clears, so "clear through
        // id N" never hits a record enqueued after the batch was read.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_commands (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                intent_id INTEGER,
                command_json TEXT NOT NULL,
                enqueued_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Current time as Unix seconds (for DB timestamps).
pub(crate) fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
