//! Fan-out dispatch: one operation executed against many agents at once.
//!
//! Every targeted agent gets its own task; a failure in one never aborts or
//! delays the others. All tasks report into a single result channel sized to
//! the number of targets, and the channel closes only once every task has
//! reported exactly once. Consumers therefore see a sequential stream of
//! results in completion order even though production is parallel.

pub mod sink;

#[cfg(test)]
mod tests;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::core::audit::AuditLog;
use crate::core::fleet::{Agent, ConnectionError, FleetRegistry};
use crate::core::observers::ObserverRegistry;
use crate::core::staging;
use crate::core::store::FleetStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    PushFile,
    RunCommand,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::PushFile => "push_file",
            OperationKind::RunCommand => "run_command",
        }
    }
}

/// The unit of work fanned out to agents. Immutable once dispatch starts;
/// its outcome lives on in the persisted job records.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub id: String,
    pub kind: OperationKind,
    pub payload: serde_json::Value,
    pub initiated_by: String,
}

/// Outcome of one agent's execution. Ephemeral: the sink converts it into a
/// job update, an audit entry and an observer notification.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub agent_id: String,
    pub success: bool,
    pub message: String,
    pub response: Option<serde_json::Value>,
}

impl DispatchResult {
    fn succeeded(agent_id: &str, message: String, response: serde_json::Value) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            success: true,
            message,
            response: Some(response),
        }
    }

    fn failed(agent_id: &str, message: String) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            success: false,
            message,
            response: None,
        }
    }
}

/// Everything a fan-out needs around the agents themselves. Cheap to clone;
/// shared registries are passed in explicitly rather than reached for as
/// globals.
#[derive(Clone)]
pub struct DispatchContext {
    pub fleet: Arc<FleetRegistry>,
    pub store: Arc<FleetStore>,
    pub audit: Arc<AuditLog>,
    pub observers: Arc<ObserverRegistry>,
}

/// Runs one execution per agent concurrently and returns the shared result
/// channel. Channel capacity equals the number of targets, so no task ever
/// stalls on its single send.
pub fn dispatch(
    request: Arc<OperationRequest>,
    agents: Vec<Arc<Agent>>,
) -> mpsc::Receiver<DispatchResult> {
    let (tx, rx) = mpsc::channel(agents.len().max(1));

    let mut set = JoinSet::new();
    for agent in agents {
        let tx = tx.clone();
        let request = request.clone();
        set.spawn(async move {
            let result = execute_one(&request, &agent).await;
            let _ = tx.send(result).await;
        });
    }
    // Each task owns one sender clone; the channel closes exactly when the
    // last task has delivered its result.
    drop(tx);

    tokio::spawn(async move {
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!("Dispatch execution task aborted: {}", e);
            }
        }
    });

    rx
}

async fn execute_one(request: &OperationRequest, agent: &Agent) -> DispatchResult {
    // Agent-local policy short-circuits without touching the transport.
    if request.kind == OperationKind::PushFile && !agent.push_enabled {
        return DispatchResult::failed(&agent.id, "file pushes are disabled on this agent".into());
    }

    match agent
        .connection
        .send_request(request.kind, request.payload.clone())
        .await
    {
        Ok(response) => DispatchResult::succeeded(&agent.id, response.message, response.payload),
        Err(err) => DispatchResult::failed(&agent.id, rewrite_unsupported(err)),
    }
}

/// The transport's "unknown request" rejection means the agent predates this
/// operation kind; surface an actionable hint instead of the raw error.
fn rewrite_unsupported(err: ConnectionError) -> String {
    match err {
        ConnectionError::UnknownRequest => {
            "agent does not support this operation, please upgrade the agent to the latest version"
                .to_string()
        }
        other => other.to_string(),
    }
}

/// A fully-prepared fan-out: job records exist, targets are resolved, and
/// [`Fanout::run`] drives it to completion.
pub struct Fanout {
    ctx: DispatchContext,
    request: Arc<OperationRequest>,
    agents: Vec<Arc<Agent>>,
    multi_job_id: String,
    jobs_by_agent: HashMap<String, String>,
    staged_file: Option<PathBuf>,
}

impl Fanout {
    /// Creates the multi-job and one running job per resolved agent. Called
    /// before any remote work so history exists even if the process dies
    /// mid-dispatch.
    pub async fn begin(
        ctx: DispatchContext,
        schedule_id: Option<&str>,
        request: OperationRequest,
        agents: Vec<Arc<Agent>>,
        staged_file: Option<PathBuf>,
    ) -> Result<Self> {
        let multi_job = ctx.store.create_multi_job(schedule_id).await?;

        let mut jobs_by_agent = HashMap::new();
        for agent in &agents {
            let job = ctx.store.create_job(&multi_job.jid, &agent.id).await?;
            jobs_by_agent.insert(agent.id.clone(), job.job_id);
        }

        Ok(Self {
            ctx,
            request: Arc::new(request),
            agents,
            multi_job_id: multi_job.jid,
            jobs_by_agent,
            staged_file,
        })
    }

    pub fn multi_job_id(&self) -> &str {
        &self.multi_job_id
    }

    /// Fans out, drains every result through the sink, then removes any
    /// temporary resources staged for the operation.
    pub async fn run(self) {
        info!(
            "Dispatching {} [{}] to {} agent(s)",
            self.request.kind.as_str(),
            self.request.id,
            self.agents.len()
        );

        let rx = dispatch(self.request.clone(), self.agents);
        sink::consume_results(
            &self.ctx,
            &self.request,
            &self.multi_job_id,
            &self.jobs_by_agent,
            rx,
        )
        .await;

        if let Some(path) = self.staged_file {
            staging::remove_staged(&path).await;
        }
    }
}
