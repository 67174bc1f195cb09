mod commands;
mod jobs;
pub mod query;
mod schedules;
pub mod types;

#[cfg(test)]
mod tests;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::platform::{NativePlatform, Platform};

/// SQLite-backed store for dispatch history (multi-jobs and their per-agent
/// jobs), schedule definitions and the saved-command library. All tables live
/// in one database file so cascades stay within a single connection.
pub struct FleetStore {
    db: Arc<Mutex<Connection>>,
}

impl FleetStore {
    pub async fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        if !data_dir.exists() {
            tokio::fs::create_dir_all(data_dir).await?;
        }
        NativePlatform::restrict_dir_permissions(data_dir);

        let db_path = data_dir.join("drover.db");
        let db = Connection::open(&db_path)?;
        NativePlatform::restrict_file_permissions(&db_path);

        db.execute(
            "CREATE TABLE IF NOT EXISTS multi_jobs (
                jid TEXT PRIMARY KEY,
                schedule_id TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                started_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS jobs (
                job_id TEXT PRIMARY KEY,
                multi_job_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                status TEXT NOT NULL,
                message TEXT,
                started_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                finished_at DATETIME,
                UNIQUE (multi_job_id, agent_id)
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS schedules (
                id TEXT PRIMARY KEY,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                created_by TEXT NOT NULL,
                name TEXT NOT NULL,
                schedule TEXT NOT NULL,
                type TEXT NOT NULL,
                details TEXT NOT NULL
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS commands (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                created_by TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_by TEXT NOT NULL,
                cmd TEXT NOT NULL
            )",
            [],
        )?;

        info!("Fleet store ready at {:?}", db_path);

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Shared handle to the underlying connection, for subsystems that keep
    /// their own tables in the same database (audit log).
    pub fn db(&self) -> Arc<Mutex<Connection>> {
        self.db.clone()
    }
}
