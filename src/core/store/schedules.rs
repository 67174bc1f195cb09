use anyhow::Result;
use rusqlite::{Row, params, params_from_iter};

use super::FleetStore;
use super::query::{ListOptions, SortDirection, SortOption, append_list_options};
use super::types::ScheduleRecord;

/// Correlated subquery attaching the start time of the most recent multi-job.
const LAST_STARTED_AT_FIELD: &str = "(SELECT started_at FROM multi_jobs \
     WHERE schedule_id = s.id ORDER BY started_at DESC LIMIT 1) AS last_started_at";

const SCHEDULE_COLUMNS: &str = "s.id, s.created_at, s.created_by, s.name, s.schedule, s.type, s.details";

fn schedule_from_row(row: &Row) -> rusqlite::Result<ScheduleRecord> {
    Ok(ScheduleRecord {
        id: row.get(0)?,
        created_at: row.get(1)?,
        created_by: row.get(2)?,
        name: row.get(3)?,
        schedule: row.get(4)?,
        kind: row.get(5)?,
        details: row.get(6)?,
        last_started_at: row.get(7)?,
    })
}

impl FleetStore {
    pub async fn insert_schedule(&self, s: &ScheduleRecord) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO schedules (id, created_by, name, schedule, type, details)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![s.id, s.created_by, s.name, s.schedule, s.kind, s.details],
        )?;
        Ok(())
    }

    /// Updates the mutable fields only; creation metadata is immutable.
    /// Returns false when the id is unknown.
    pub async fn update_schedule(&self, s: &ScheduleRecord) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE schedules SET name = ?1, schedule = ?2, type = ?3, details = ?4
             WHERE id = ?5",
            params![s.name, s.schedule, s.kind, s.details, s.id],
        )?;
        Ok(rows > 0)
    }

    pub async fn get_schedule(&self, id: &str) -> Result<Option<ScheduleRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS}, {LAST_STARTED_AT_FIELD} FROM schedules s WHERE id = ?1 LIMIT 1"
        ))?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(schedule_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_schedules(&self, options: &ListOptions) -> Result<Vec<ScheduleRecord>> {
        let mut options = options.clone();
        if options.sorts.is_empty() {
            options.sorts.push(SortOption {
                field: "created_at".into(),
                direction: SortDirection::Desc,
            });
        }
        let (q, values) = append_list_options(
            &format!("SELECT {SCHEDULE_COLUMNS}, {LAST_STARTED_AT_FIELD} FROM schedules s"),
            &options,
        );

        let db = self.db.lock().await;
        let mut stmt = db.prepare(&q)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), schedule_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Deletes a schedule and cascades through its multi-jobs to their jobs.
    /// Returns false when the id is unknown, detected via the affected-row
    /// count of the schedule delete itself.
    pub async fn delete_schedule(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let affected = db.execute("DELETE FROM schedules WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Ok(false);
        }

        db.execute(
            "DELETE FROM jobs WHERE multi_job_id IN
                 (SELECT jid FROM multi_jobs WHERE schedule_id = ?1)",
            params![id],
        )?;
        db.execute(
            "DELETE FROM multi_jobs WHERE schedule_id = ?1",
            params![id],
        )?;
        Ok(true)
    }
}
