use anyhow::Result;
use rusqlite::{Row, params, params_from_iter};

use super::FleetStore;
use super::query::{ListOptions, SortDirection, SortOption, append_list_options};
use super::types::CommandRecord;

const COMMAND_COLUMNS: &str = "id, name, created_at, created_by, updated_at, updated_by, cmd";

fn command_from_row(row: &Row) -> rusqlite::Result<CommandRecord> {
    Ok(CommandRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
        created_by: row.get(3)?,
        updated_at: row.get(4)?,
        updated_by: row.get(5)?,
        cmd: row.get(6)?,
    })
}

impl FleetStore {
    /// Insert-or-update: an empty id inserts under a fresh UUID, a known id
    /// updates the mutable fields. Returns the id the command is saved under.
    pub async fn save_command(
        &self,
        id: &str,
        name: &str,
        cmd: &str,
        saved_by: &str,
    ) -> Result<String> {
        let db = self.db.lock().await;
        if id.is_empty() {
            let command_id = uuid::Uuid::new_v4().to_string();
            db.execute(
                "INSERT INTO commands (id, name, created_by, updated_by, cmd)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![command_id, name, saved_by, saved_by, cmd],
            )?;
            return Ok(command_id);
        }

        db.execute(
            "UPDATE commands
             SET name = ?1, updated_at = CURRENT_TIMESTAMP, updated_by = ?2, cmd = ?3
             WHERE id = ?4",
            params![name, saved_by, cmd, id],
        )?;
        Ok(id.to_string())
    }

    pub async fn get_command(&self, id: &str) -> Result<Option<CommandRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {COMMAND_COLUMNS} FROM commands WHERE id = ?1 LIMIT 1"
        ))?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(command_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_commands(&self, options: &ListOptions) -> Result<Vec<CommandRecord>> {
        let mut options = options.clone();
        if options.sorts.is_empty() {
            options.sorts.push(SortOption {
                field: "name".into(),
                direction: SortDirection::Asc,
            });
        }
        let (q, values) = append_list_options(
            &format!("SELECT {COMMAND_COLUMNS} FROM commands"),
            &options,
        );

        let db = self.db.lock().await;
        let mut stmt = db.prepare(&q)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), command_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Returns false when the id is unknown.
    pub async fn delete_command(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute("DELETE FROM commands WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}
