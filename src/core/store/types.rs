use serde::Serialize;

/// One fan-out instance. Child jobs reference `jid`; `schedule_id` is set
/// only for schedule-triggered runs.
#[derive(Debug, Clone, Serialize)]
pub struct MultiJobRecord {
    pub jid: String,
    pub schedule_id: Option<String>,
    pub created_at: String,
    pub started_at: String,
}

/// One agent's execution within a multi-job. `finished_at` stays null while
/// the execution is in flight.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub job_id: String,
    pub multi_job_id: String,
    pub agent_id: String,
    pub status: String,
    pub message: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleRecord {
    pub id: String,
    pub created_at: String,
    pub created_by: String,
    pub name: String,
    pub schedule: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub details: String,
    /// `started_at` of the most recent multi-job, absent if never run.
    pub last_started_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandRecord {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub created_by: String,
    pub updated_at: String,
    pub updated_by: String,
    pub cmd: String,
}
