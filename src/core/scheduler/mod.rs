//! Recurring triggers: persisted schedules registered as runtime cron jobs.
//!
//! A schedule's cadence is validated by constructing the runtime cron job
//! first; only after the scheduler accepted it is the definition persisted,
//! with the runtime job rolled back if the write fails.
//!
//! Overlap avoidance is advisory, not exclusive: each tick consults the
//! in-progress job count (bounded by a staleness window) and skips when it
//! is nonzero. Two ticks racing on the same schedule can both read zero and
//! both dispatch; that is an accepted trade-off, not something a lock
//! should "fix".

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::dispatch::{DispatchContext, Fanout, OperationKind, OperationRequest};
use crate::core::fleet::validate_targets;
use crate::core::store::query::ListOptions;
use crate::core::store::types::ScheduleRecord;

pub const SCHEDULE_KIND_COMMAND: &str = "command";
pub const SCHEDULE_KIND_PUSH_FILE: &str = "push_file";

/// Targets plus operation parameters, stored as the schedule's serialized
/// `details` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleDetails {
    #[serde(default)]
    pub client_ids: Vec<String>,
    #[serde(default)]
    pub group_ids: Vec<String>,
    /// Inline command for `command` schedules...
    pub command: Option<String>,
    /// ...or a reference into the saved-command library.
    pub command_id: Option<String>,
    /// Server-local file for `push_file` schedules.
    pub source_path: Option<String>,
    pub destination: Option<String>,
}

/// Checks a schedule's type/details before anything touches the store.
pub fn validate_definition(kind: &str, details_json: &str) -> Result<ScheduleDetails> {
    let details: ScheduleDetails =
        serde_json::from_str(details_json).context("invalid schedule details")?;

    if details.client_ids.is_empty() && details.group_ids.is_empty() {
        bail!("schedule details must target at least one agent or group");
    }

    match kind {
        SCHEDULE_KIND_COMMAND => {
            if details.command.is_none() && details.command_id.is_none() {
                bail!("command schedules need a command or a command_id");
            }
        }
        SCHEDULE_KIND_PUSH_FILE => {
            if details.source_path.is_none() || details.destination.is_none() {
                bail!("push_file schedules need source_path and destination");
            }
        }
        other => bail!("unknown schedule type: {}", other),
    }

    Ok(details)
}

pub struct ScheduleEngine {
    ctx: DispatchContext,
    scheduler: Arc<Mutex<JobScheduler>>,
    /// schedule id → runtime cron job id
    runtime_jobs: Arc<Mutex<HashMap<String, Uuid>>>,
    overlap_timeout_secs: i64,
}

impl ScheduleEngine {
    pub fn new(
        ctx: DispatchContext,
        scheduler: Arc<Mutex<JobScheduler>>,
        overlap_timeout_secs: i64,
    ) -> Self {
        Self {
            ctx,
            scheduler,
            runtime_jobs: Arc::new(Mutex::new(HashMap::new())),
            overlap_timeout_secs,
        }
    }

    /// Registers the runtime cron job, then persists the definition. A DB
    /// failure rolls the runtime job back so the two never drift apart.
    pub async fn create(&self, schedule: ScheduleRecord) -> Result<()> {
        let job_id = self.register(&schedule).await?;

        if let Err(e) = self.ctx.store.insert_schedule(&schedule).await {
            if let Err(remove_err) = self.remove_runtime_job(job_id).await {
                warn!(
                    "Failed to rollback runtime schedule '{}' ({}): {}",
                    schedule.name, job_id, remove_err
                );
            }
            return Err(e);
        }

        self.runtime_jobs
            .lock()
            .await
            .insert(schedule.id.clone(), job_id);
        info!("Schedule '{}' registered ({})", schedule.name, schedule.id);
        Ok(())
    }

    /// Re-registers the cron job with the new cadence and updates the
    /// mutable fields. Returns false when the schedule id is unknown.
    pub async fn update(&self, schedule: ScheduleRecord) -> Result<bool> {
        let new_job_id = self.register(&schedule).await?;

        match self.ctx.store.update_schedule(&schedule).await {
            Ok(true) => {}
            Ok(false) => {
                if let Err(e) = self.remove_runtime_job(new_job_id).await {
                    warn!("Failed to remove orphaned runtime job {}: {}", new_job_id, e);
                }
                return Ok(false);
            }
            Err(e) => {
                if let Err(remove_err) = self.remove_runtime_job(new_job_id).await {
                    warn!(
                        "Failed to rollback runtime schedule '{}' ({}): {}",
                        schedule.name, new_job_id, remove_err
                    );
                }
                return Err(e);
            }
        }

        let previous = self
            .runtime_jobs
            .lock()
            .await
            .insert(schedule.id.clone(), new_job_id);
        if let Some(old_id) = previous
            && old_id != new_job_id
            && let Err(e) = self.remove_runtime_job(old_id).await
        {
            warn!(
                "Replaced schedule '{}' but failed to remove previous runtime job {}: {}",
                schedule.name, old_id, e
            );
        }
        Ok(true)
    }

    /// Deletes the definition (cascading to its history) and unschedules the
    /// runtime job. Returns false when the schedule id is unknown.
    pub async fn delete(&self, schedule_id: &str) -> Result<bool> {
        if !self.ctx.store.delete_schedule(schedule_id).await? {
            return Ok(false);
        }

        if let Some(job_id) = self.runtime_jobs.lock().await.remove(schedule_id)
            && let Err(e) = self.remove_runtime_job(job_id).await
        {
            warn!(
                "Schedule {} was deleted, but runtime unschedule failed for {}: {}",
                schedule_id, job_id, e
            );
        }
        Ok(true)
    }

    /// Re-registers every persisted schedule at boot. A broken schedule is
    /// logged and skipped, never fatal to the rest.
    pub async fn load_persisted(&self) -> Result<usize> {
        let schedules = self.ctx.store.list_schedules(&ListOptions::default()).await?;
        let mut registered = 0;

        for schedule in schedules {
            match self.register(&schedule).await {
                Ok(job_id) => {
                    self.runtime_jobs
                        .lock()
                        .await
                        .insert(schedule.id.clone(), job_id);
                    registered += 1;
                }
                Err(e) => {
                    warn!("Skipping persisted schedule '{}': {}", schedule.name, e);
                }
            }
        }

        info!("Registered {} persisted schedule(s)", registered);
        Ok(registered)
    }

    async fn register(&self, schedule: &ScheduleRecord) -> Result<Uuid> {
        let ctx = self.ctx.clone();
        let overlap_timeout_secs = self.overlap_timeout_secs;
        let schedule_id = schedule.id.clone();
        let schedule_name = schedule.name.clone();

        let cron_job = Job::new_async(schedule.schedule.as_str(), move |_uuid, mut _l| {
            let ctx = ctx.clone();
            let schedule_id = schedule_id.clone();
            let schedule_name = schedule_name.clone();

            Box::pin(async move {
                if let Err(e) = fire(ctx, overlap_timeout_secs, &schedule_id).await {
                    error!("Schedule '{}' tick failed: {}", schedule_name, e);
                }
            })
        })
        .map_err(|e| anyhow!("Invalid cron expression: {}", e))?;

        self.scheduler
            .lock()
            .await
            .add(cron_job)
            .await
            .map_err(|e| anyhow!("Failed to register schedule: {}", e))
    }

    async fn remove_runtime_job(&self, job_id: Uuid) -> Result<()> {
        self.scheduler
            .lock()
            .await
            .remove(&job_id)
            .await
            .map_err(|e| anyhow!("{}", e))
    }
}

/// One schedule tick: skip while a previous run is still in progress,
/// otherwise resolve targets and drive a full fan-out.
pub async fn fire(
    ctx: DispatchContext,
    overlap_timeout_secs: i64,
    schedule_id: &str,
) -> Result<()> {
    let in_progress = ctx
        .store
        .count_jobs_in_progress(schedule_id, overlap_timeout_secs)
        .await?;
    if in_progress > 0 {
        info!(
            "Schedule {} still has {} job(s) in progress, skipping this tick",
            schedule_id, in_progress
        );
        return Ok(());
    }

    let Some(schedule) = ctx.store.get_schedule(schedule_id).await? else {
        warn!("Schedule {} no longer exists, skipping tick", schedule_id);
        return Ok(());
    };

    let details: ScheduleDetails = serde_json::from_str(&schedule.details)
        .with_context(|| format!("schedule '{}' has invalid details", schedule.name))?;

    let (agents, from_groups) = ctx
        .fleet
        .resolve_targets(&details.client_ids, &details.group_ids)
        .await;
    if let Err(e) = validate_targets(&details.client_ids, &details.group_ids, &agents, from_groups)
    {
        warn!("Schedule '{}' resolved no targets: {}", schedule.name, e);
        return Ok(());
    }

    let request = build_operation(&ctx, &schedule, &details).await?;
    let fanout = Fanout::begin(ctx.clone(), Some(&schedule.id), request, agents, None).await?;
    info!(
        "Schedule '{}' started multi-job {}",
        schedule.name,
        fanout.multi_job_id()
    );
    fanout.run().await;
    Ok(())
}

async fn build_operation(
    ctx: &DispatchContext,
    schedule: &ScheduleRecord,
    details: &ScheduleDetails,
) -> Result<OperationRequest> {
    let (kind, payload) = match schedule.kind.as_str() {
        SCHEDULE_KIND_COMMAND => {
            let cmd = match (&details.command, &details.command_id) {
                (Some(cmd), _) => cmd.clone(),
                (None, Some(command_id)) => ctx
                    .store
                    .get_command(command_id)
                    .await?
                    .map(|c| c.cmd)
                    .ok_or_else(|| anyhow!("saved command {} not found", command_id))?,
                (None, None) => bail!("schedule has neither command nor command_id"),
            };
            (
                OperationKind::RunCommand,
                serde_json::json!({ "command": cmd }),
            )
        }
        SCHEDULE_KIND_PUSH_FILE => {
            let source_path = details
                .source_path
                .as_deref()
                .ok_or_else(|| anyhow!("push_file schedule is missing source_path"))?;
            let destination = details
                .destination
                .as_deref()
                .ok_or_else(|| anyhow!("push_file schedule is missing destination"))?;
            (
                OperationKind::PushFile,
                serde_json::json!({
                    "source_path": source_path,
                    "destination": destination,
                }),
            )
        }
        other => bail!("unknown schedule type: {}", other),
    };

    Ok(OperationRequest {
        id: Uuid::new_v4().to_string(),
        kind,
        payload,
        initiated_by: format!("schedule:{}", schedule.name),
    })
}
