//! Consumes a dispatch's result stream and turns every outcome into durable
//! and observable state: job record, audit entry, live notification — in
//! that order, per result. The three steps are not transactional; a crash
//! between them can leave the job updated without the audit entry or
//! notification, which is accepted in favor of availability.

use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{error, info};

use super::{DispatchContext, DispatchResult, OperationKind, OperationRequest};
use crate::core::audit::{AuditAction, AuditApplication};

fn audit_application(kind: OperationKind) -> AuditApplication {
    match kind {
        OperationKind::PushFile => AuditApplication::Uploads,
        OperationKind::RunCommand => AuditApplication::Commands,
    }
}

pub async fn consume_results(
    ctx: &DispatchContext,
    request: &OperationRequest,
    multi_job_id: &str,
    jobs_by_agent: &HashMap<String, String>,
    mut rx: mpsc::Receiver<DispatchResult>,
) {
    while let Some(result) = rx.recv().await {
        let Some(job_id) = jobs_by_agent.get(&result.agent_id) else {
            error!(
                "Dispatch [{}] produced a result for untracked agent {}",
                request.id, result.agent_id
            );
            continue;
        };

        let status = if result.success { "success" } else { "failed" };
        if let Err(e) = ctx
            .store
            .finish_job(job_id, status, Some(&result.message))
            .await
        {
            error!("Failed to finish job {}: {}", job_id, e);
        }

        let outcome = serde_json::json!({
            "multi_job_id": multi_job_id,
            "job_id": job_id,
            "agent_id": result.agent_id,
            "status": status,
            "message": result.message,
            "response": result.response,
        });

        let action = if result.success {
            info!(
                "Dispatch [{}] succeeded on agent {}",
                request.id, result.agent_id
            );
            AuditAction::Success
        } else {
            error!(
                "Dispatch [{}] failed on agent {}: {}",
                request.id, result.agent_id, result.message
            );
            AuditAction::Failed
        };

        ctx.audit
            .entry(audit_application(request.kind), action)
            .with_id(&request.id)
            .with_agent(&result.agent_id)
            .with_request(request.payload.clone())
            .with_response(outcome.clone())
            .save()
            .await;

        ctx.observers.publish(&outcome).await;
    }
}
