use axum::{
    Json,
    extract::{Path, Query, State},
};
use std::collections::HashMap;

use super::super::AppState;
use crate::core::store::query::ListOptions;

const COMMAND_FIELDS: &[&str] = &["id", "name", "created_by", "created_at", "updated_at"];

#[derive(serde::Deserialize)]
pub struct CommandBody {
    pub name: String,
    pub cmd: String,
    pub created_by: Option<String>,
}

fn saved_by(created_by: &Option<String>) -> &str {
    created_by
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("operator")
}

fn validate_body(body: &CommandBody) -> Result<(), &'static str> {
    if body.name.trim().is_empty() || body.cmd.trim().is_empty() {
        return Err("name and cmd are required");
    }
    Ok(())
}

pub async fn list_commands_endpoint(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let options = match ListOptions::from_query(&params, COMMAND_FIELDS) {
        Ok(options) => options,
        Err(e) => {
            return Json(serde_json::json!({ "success": false, "error": e.to_string() }));
        }
    };

    match state.store.list_commands(&options).await {
        Ok(commands) => Json(serde_json::json!({ "success": true, "commands": commands })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

pub async fn get_command_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Json<serde_json::Value> {
    match state.store.get_command(&id).await {
        Ok(Some(command)) => Json(serde_json::json!({ "success": true, "command": command })),
        Ok(None) => Json(serde_json::json!({ "success": false, "error": "Command not found" })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

pub async fn save_command_endpoint(
    State(state): State<AppState>,
    Json(body): Json<CommandBody>,
) -> Json<serde_json::Value> {
    if let Err(e) = validate_body(&body) {
        return Json(serde_json::json!({ "success": false, "error": e }));
    }

    match state
        .store
        .save_command("", body.name.trim(), body.cmd.trim(), saved_by(&body.created_by))
        .await
    {
        Ok(id) => Json(serde_json::json!({ "success": true, "id": id })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

pub async fn update_command_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<CommandBody>,
) -> Json<serde_json::Value> {
    if let Err(e) = validate_body(&body) {
        return Json(serde_json::json!({ "success": false, "error": e }));
    }

    match state.store.get_command(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return Json(serde_json::json!({ "success": false, "error": "Command not found" }));
        }
        Err(e) => {
            return Json(serde_json::json!({ "success": false, "error": e.to_string() }));
        }
    }

    match state
        .store
        .save_command(&id, body.name.trim(), body.cmd.trim(), saved_by(&body.created_by))
        .await
    {
        Ok(id) => Json(serde_json::json!({ "success": true, "id": id })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

pub async fn delete_command_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Json<serde_json::Value> {
    match state.store.delete_command(&id).await {
        Ok(true) => Json(serde_json::json!({ "success": true, "message": "Command removed" })),
        Ok(false) => Json(serde_json::json!({ "success": false, "error": "Command not found" })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}
