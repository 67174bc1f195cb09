//! Append-only audit trail for operator-visible actions.
//!
//! Entries are written through a builder so call sites read like the action
//! they record. Write failures are logged and swallowed: the audit trail is
//! an observability surface, never a reason to fail the operation itself.

use anyhow::Result;
use rusqlite::{Connection, Row, params};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::error;

use crate::core::fleet::Agent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditApplication {
    Uploads,
    Commands,
    Schedules,
}

impl AuditApplication {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditApplication::Uploads => "uploads",
            AuditApplication::Commands => "commands",
            AuditApplication::Schedules => "schedules",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Delete,
    Success,
    Failed,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Delete => "delete",
            AuditAction::Success => "success",
            AuditAction::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub id: i64,
    pub application: String,
    pub action: String,
    pub target_id: Option<String>,
    pub agent_id: Option<String>,
    pub request: Option<String>,
    pub response: Option<String>,
    pub created_at: String,
}

fn record_from_row(row: &Row) -> rusqlite::Result<AuditRecord> {
    Ok(AuditRecord {
        id: row.get(0)?,
        application: row.get(1)?,
        action: row.get(2)?,
        target_id: row.get(3)?,
        agent_id: row.get(4)?,
        request: row.get(5)?,
        response: row.get(6)?,
        created_at: row.get(7)?,
    })
}

pub struct AuditLog {
    db: Arc<Mutex<Connection>>,
}

impl AuditLog {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    pub async fn initialize(&self) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                application TEXT NOT NULL,
                action TEXT NOT NULL,
                target_id TEXT,
                agent_id TEXT,
                request_json TEXT,
                response_json TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;
        Ok(())
    }

    pub fn entry(&self, application: AuditApplication, action: AuditAction) -> AuditEntry<'_> {
        AuditEntry {
            log: self,
            application,
            action,
            target_id: None,
            agent_id: None,
            request: None,
            response: None,
        }
    }

    pub async fn list_recent(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, application, action, target_id, agent_id, request_json, response_json, created_at
             FROM audit_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], record_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn list_for_target(&self, target_id: &str) -> Result<Vec<AuditRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, application, action, target_id, agent_id, request_json, response_json, created_at
             FROM audit_log WHERE target_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![target_id], record_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

pub struct AuditEntry<'a> {
    log: &'a AuditLog,
    application: AuditApplication,
    action: AuditAction,
    target_id: Option<String>,
    agent_id: Option<String>,
    request: Option<serde_json::Value>,
    response: Option<serde_json::Value>,
}

impl AuditEntry<'_> {
    pub fn with_id(mut self, target_id: &str) -> Self {
        self.target_id = Some(target_id.to_string());
        self
    }

    pub fn with_agent(mut self, agent_id: &str) -> Self {
        self.agent_id = Some(agent_id.to_string());
        self
    }

    pub fn with_request(mut self, request: serde_json::Value) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_response(mut self, response: serde_json::Value) -> Self {
        self.response = Some(response);
        self
    }

    pub async fn save(self) {
        let agent_ids = [self.agent_id.clone()];
        if let Err(e) = self.write(&agent_ids).await {
            error!("Failed to write audit entry: {}", e);
        }
    }

    /// Records the same entry once per targeted agent.
    pub async fn save_for_agents(self, agents: &[Arc<Agent>]) {
        let agent_ids: Vec<Option<String>> =
            agents.iter().map(|a| Some(a.id.clone())).collect();
        if let Err(e) = self.write(&agent_ids).await {
            error!("Failed to write audit entries: {}", e);
        }
    }

    async fn write(&self, agent_ids: &[Option<String>]) -> Result<()> {
        let request_json = self.request.as_ref().map(|v| v.to_string());
        let response_json = self.response.as_ref().map(|v| v.to_string());

        let db = self.log.db.lock().await;
        for agent_id in agent_ids {
            db.execute(
                "INSERT INTO audit_log (application, action, target_id, agent_id, request_json, response_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    self.application.as_str(),
                    self.action.as_str(),
                    self.target_id,
                    agent_id,
                    request_json,
                    response_json,
                ],
            )?;
        }
        Ok(())
    }
}
