use anyhow::Result;
use rusqlite::{Row, params, params_from_iter};

use super::FleetStore;
use super::query::{ListOptions, SortDirection, SortOption, append_list_options};
use super::types::{JobRecord, MultiJobRecord};

fn multi_job_from_row(row: &Row) -> rusqlite::Result<MultiJobRecord> {
    Ok(MultiJobRecord {
        jid: row.get(0)?,
        schedule_id: row.get(1)?,
        created_at: row.get(2)?,
        started_at: row.get(3)?,
    })
}

fn job_from_row(row: &Row) -> rusqlite::Result<JobRecord> {
    Ok(JobRecord {
        job_id: row.get(0)?,
        multi_job_id: row.get(1)?,
        agent_id: row.get(2)?,
        status: row.get(3)?,
        message: row.get(4)?,
        started_at: row.get(5)?,
        finished_at: row.get(6)?,
    })
}

const MULTI_JOB_COLUMNS: &str = "jid, schedule_id, created_at, started_at";
const JOB_COLUMNS: &str =
    "job_id, multi_job_id, agent_id, status, message, started_at, finished_at";

impl FleetStore {
    pub async fn create_multi_job(
        &self,
        schedule_id: Option<&str>,
    ) -> Result<MultiJobRecord> {
        let jid = uuid::Uuid::new_v4().to_string();
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO multi_jobs (jid, schedule_id) VALUES (?1, ?2)",
            params![jid, schedule_id],
        )?;
        let rec = db.query_row(
            &format!("SELECT {MULTI_JOB_COLUMNS} FROM multi_jobs WHERE jid = ?1"),
            params![jid],
            multi_job_from_row,
        )?;
        Ok(rec)
    }

    pub async fn get_multi_job(&self, jid: &str) -> Result<Option<MultiJobRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {MULTI_JOB_COLUMNS} FROM multi_jobs WHERE jid = ?1 LIMIT 1"
        ))?;
        let mut rows = stmt.query(params![jid])?;
        match rows.next()? {
            Some(row) => Ok(Some(multi_job_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_multi_jobs(&self, options: &ListOptions) -> Result<Vec<MultiJobRecord>> {
        let mut options = options.clone();
        if options.sorts.is_empty() {
            options.sorts.push(SortOption {
                field: "started_at".into(),
                direction: SortDirection::Desc,
            });
        }
        let (q, values) = append_list_options(
            &format!("SELECT {MULTI_JOB_COLUMNS} FROM multi_jobs"),
            &options,
        );

        let db = self.db.lock().await;
        let mut stmt = db.prepare(&q)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), multi_job_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn create_job(&self, multi_job_id: &str, agent_id: &str) -> Result<JobRecord> {
        let job_id = uuid::Uuid::new_v4().to_string();
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO jobs (job_id, multi_job_id, agent_id, status) VALUES (?1, ?2, ?3, 'running')",
            params![job_id, multi_job_id, agent_id],
        )?;
        let rec = db.query_row(
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = ?1"),
            params![job_id],
            job_from_row,
        )?;
        Ok(rec)
    }

    /// Marks a job finished with its outcome. Returns false when the job id
    /// is unknown.
    pub async fn finish_job(
        &self,
        job_id: &str,
        status: &str,
        message: Option<&str>,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE jobs
             SET status = ?1, message = ?2, finished_at = CURRENT_TIMESTAMP
             WHERE job_id = ?3",
            params![status, message, job_id],
        )?;
        Ok(rows > 0)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = ?1 LIMIT 1"
        ))?;
        let mut rows = stmt.query(params![job_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(job_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_jobs(&self, options: &ListOptions) -> Result<Vec<JobRecord>> {
        let mut options = options.clone();
        if options.sorts.is_empty() {
            options.sorts.push(SortOption {
                field: "started_at".into(),
                direction: SortDirection::Desc,
            });
        }
        let (q, values) =
            append_list_options(&format!("SELECT {JOB_COLUMNS} FROM jobs"), &options);

        let db = self.db.lock().await;
        let mut stmt = db.prepare(&q)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), job_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn list_jobs_for_multi_job(&self, multi_job_id: &str) -> Result<Vec<JobRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE multi_job_id = ?1 ORDER BY agent_id ASC"
        ))?;
        let rows = stmt.query_map(params![multi_job_id], job_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Counts jobs of the given schedule that are still in flight: unfinished
    /// AND started within the last `timeout_secs`. Unfinished jobs older than
    /// the window count as abandoned, not in progress — so a stuck run stops
    /// blocking its schedule once the window has passed.
    ///
    /// The check is advisory: it takes no lock, and two scheduler ticks
    /// racing on the same schedule can both read zero and both dispatch.
    pub async fn count_jobs_in_progress(
        &self,
        schedule_id: &str,
        timeout_secs: i64,
    ) -> Result<i64> {
        let db = self.db.lock().await;
        let count = db.query_row(
            "SELECT count(*)
             FROM jobs
             JOIN multi_jobs ON jobs.multi_job_id = multi_jobs.jid
             WHERE schedule_id = ?1
               AND finished_at IS NULL
               AND strftime('%s', 'now') - strftime('%s', jobs.started_at) <= ?2",
            params![schedule_id, timeout_secs],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Deletes a multi-job and its child jobs. Returns false when the jid is
    /// unknown.
    pub async fn delete_multi_job(&self, jid: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let affected = db.execute("DELETE FROM multi_jobs WHERE jid = ?1", params![jid])?;
        if affected == 0 {
            return Ok(false);
        }
        db.execute("DELETE FROM jobs WHERE multi_job_id = ?1", params![jid])?;
        Ok(true)
    }
}
