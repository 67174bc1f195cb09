use axum::{Json, extract::State};
use base64::Engine;
use uuid::Uuid;

use super::super::AppState;
use crate::core::audit::{AuditAction, AuditApplication};
use crate::core::dispatch::{Fanout, OperationKind, OperationRequest};
use crate::core::fleet::validate_targets;
use crate::core::staging;

fn operator(created_by: &Option<String>) -> String {
    created_by
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("operator")
        .to_string()
}

#[derive(serde::Deserialize)]
pub struct PushFileRequest {
    #[serde(default)]
    pub client_ids: Vec<String>,
    #[serde(default)]
    pub group_ids: Vec<String>,
    pub destination: String,
    /// Base64-encoded file content.
    pub content: String,
    pub created_by: Option<String>,
}

pub async fn push_file_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<PushFileRequest>,
) -> Json<serde_json::Value> {
    if payload.destination.trim().is_empty() {
        return Json(serde_json::json!({
            "success": false,
            "error": "destination is required"
        }));
    }

    let content = match base64::engine::general_purpose::STANDARD.decode(&payload.content) {
        Ok(bytes) => bytes,
        Err(e) => {
            return Json(serde_json::json!({
                "success": false,
                "error": format!("content must be base64: {}", e)
            }));
        }
    };

    let (agents, from_groups) = state
        .fleet
        .resolve_targets(&payload.client_ids, &payload.group_ids)
        .await;
    if let Err(e) = validate_targets(&payload.client_ids, &payload.group_ids, &agents, from_groups)
    {
        return Json(serde_json::json!({ "success": false, "error": e.to_string() }));
    }

    let file_id = Uuid::new_v4().to_string();
    let staged = match staging::stage_push_file(&state.upload_dir, &file_id, &content).await {
        Ok(staged) => staged,
        Err(e) => {
            return Json(serde_json::json!({
                "success": false,
                "error": format!("failed to stage file: {}", e)
            }));
        }
    };

    let request = OperationRequest {
        id: file_id.clone(),
        kind: OperationKind::PushFile,
        payload: serde_json::json!({
            "file_id": file_id,
            "destination": payload.destination,
            "source_path": staged.path.display().to_string(),
            "checksum": staged.checksum,
            "size_bytes": staged.size_bytes,
        }),
        initiated_by: operator(&payload.created_by),
    };

    state
        .audit
        .entry(AuditApplication::Uploads, AuditAction::Create)
        .with_id(&file_id)
        .with_request(request.payload.clone())
        .save_for_agents(&agents)
        .await;

    let targeted = agents.len();
    let checksum = staged.checksum.clone();
    let size_bytes = staged.size_bytes;
    let fanout = match Fanout::begin(
        state.dispatch_ctx(),
        None,
        request,
        agents,
        Some(staged.path),
    )
    .await
    {
        Ok(fanout) => fanout,
        Err(e) => {
            return Json(serde_json::json!({ "success": false, "error": e.to_string() }));
        }
    };
    let multi_job_id = fanout.multi_job_id().to_string();

    // The request returns as soon as history exists; results stream to
    // observers while the fan-out runs in the background.
    tokio::spawn(fanout.run());

    Json(serde_json::json!({
        "success": true,
        "multi_job_id": multi_job_id,
        "file_id": file_id,
        "checksum": checksum,
        "size_bytes": size_bytes,
        "targeted": targeted,
        "from_groups": from_groups,
    }))
}

#[derive(serde::Deserialize)]
pub struct RunCommandRequest {
    #[serde(default)]
    pub client_ids: Vec<String>,
    #[serde(default)]
    pub group_ids: Vec<String>,
    /// Inline command...
    pub command: Option<String>,
    /// ...or a saved command from the library.
    pub command_id: Option<String>,
    pub created_by: Option<String>,
}

pub async fn run_command_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<RunCommandRequest>,
) -> Json<serde_json::Value> {
    let command = match (&payload.command, &payload.command_id) {
        (Some(cmd), _) if !cmd.trim().is_empty() => cmd.trim().to_string(),
        (_, Some(command_id)) => match state.store.get_command(command_id).await {
            Ok(Some(saved)) => saved.cmd,
            Ok(None) => {
                return Json(serde_json::json!({
                    "success": false,
                    "error": "Command not found"
                }));
            }
            Err(e) => {
                return Json(serde_json::json!({ "success": false, "error": e.to_string() }));
            }
        },
        _ => {
            return Json(serde_json::json!({
                "success": false,
                "error": "command or command_id is required"
            }));
        }
    };

    let (agents, from_groups) = state
        .fleet
        .resolve_targets(&payload.client_ids, &payload.group_ids)
        .await;
    if let Err(e) = validate_targets(&payload.client_ids, &payload.group_ids, &agents, from_groups)
    {
        return Json(serde_json::json!({ "success": false, "error": e.to_string() }));
    }

    let request = OperationRequest {
        id: Uuid::new_v4().to_string(),
        kind: OperationKind::RunCommand,
        payload: serde_json::json!({ "command": command }),
        initiated_by: operator(&payload.created_by),
    };
    let request_id = request.id.clone();

    state
        .audit
        .entry(AuditApplication::Commands, AuditAction::Create)
        .with_id(&request_id)
        .with_request(request.payload.clone())
        .save_for_agents(&agents)
        .await;

    let targeted = agents.len();
    let fanout = match Fanout::begin(state.dispatch_ctx(), None, request, agents, None).await {
        Ok(fanout) => fanout,
        Err(e) => {
            return Json(serde_json::json!({ "success": false, "error": e.to_string() }));
        }
    };
    let multi_job_id = fanout.multi_job_id().to_string();

    tokio::spawn(fanout.run());

    Json(serde_json::json!({
        "success": true,
        "multi_job_id": multi_job_id,
        "request_id": request_id,
        "targeted": targeted,
        "from_groups": from_groups,
    }))
}
