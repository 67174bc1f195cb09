use axum::{
    Json,
    extract::{Path, Query, State},
};
use std::collections::HashMap;
use uuid::Uuid;

use super::super::AppState;
use crate::core::audit::{AuditAction, AuditApplication};
use crate::core::scheduler::validate_definition;
use crate::core::store::query::ListOptions;
use crate::core::store::types::ScheduleRecord;

const SCHEDULE_FIELDS: &[&str] = &["id", "name", "type", "created_by", "created_at"];

#[derive(serde::Deserialize)]
pub struct ScheduleBody {
    pub name: String,
    /// Cron cadence expression.
    pub schedule: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub details: serde_json::Value,
    pub created_by: Option<String>,
}

fn record_from_body(id: String, body: &ScheduleBody) -> ScheduleRecord {
    ScheduleRecord {
        id,
        created_at: String::new(),
        created_by: body
            .created_by
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("operator")
            .to_string(),
        name: body.name.trim().to_string(),
        schedule: body.schedule.trim().to_string(),
        kind: body.kind.trim().to_string(),
        details: body.details.to_string(),
        last_started_at: None,
    }
}

fn validate_body(body: &ScheduleBody) -> Result<(), String> {
    if body.name.trim().is_empty() || body.schedule.trim().is_empty() {
        return Err("name and schedule are required".to_string());
    }
    validate_definition(body.kind.trim(), &body.details.to_string())
        .map(|_| ())
        .map_err(|e| e.to_string())
}

pub async fn list_schedules_endpoint(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let options = match ListOptions::from_query(&params, SCHEDULE_FIELDS) {
        Ok(options) => options,
        Err(e) => {
            return Json(serde_json::json!({ "success": false, "error": e.to_string() }));
        }
    };

    match state.store.list_schedules(&options).await {
        Ok(schedules) => Json(serde_json::json!({ "success": true, "schedules": schedules })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

pub async fn get_schedule_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Json<serde_json::Value> {
    match state.store.get_schedule(&id).await {
        Ok(Some(schedule)) => Json(serde_json::json!({ "success": true, "schedule": schedule })),
        Ok(None) => Json(serde_json::json!({ "success": false, "error": "Schedule not found" })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

pub async fn create_schedule_endpoint(
    State(state): State<AppState>,
    Json(body): Json<ScheduleBody>,
) -> Json<serde_json::Value> {
    if let Err(e) = validate_body(&body) {
        return Json(serde_json::json!({ "success": false, "error": e }));
    }

    let record = record_from_body(Uuid::new_v4().to_string(), &body);
    let schedule_id = record.id.clone();
    let details = record.details.clone();

    if let Err(e) = state.engine.create(record).await {
        return Json(serde_json::json!({ "success": false, "error": e.to_string() }));
    }

    state
        .audit
        .entry(AuditApplication::Schedules, AuditAction::Create)
        .with_id(&schedule_id)
        .with_request(serde_json::json!({
            "name": body.name,
            "schedule": body.schedule,
            "type": body.kind,
            "details": details,
        }))
        .save()
        .await;

    Json(serde_json::json!({
        "success": true,
        "message": "Schedule added",
        "id": schedule_id,
    }))
}

pub async fn update_schedule_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<ScheduleBody>,
) -> Json<serde_json::Value> {
    if let Err(e) = validate_body(&body) {
        return Json(serde_json::json!({ "success": false, "error": e }));
    }

    let record = record_from_body(id, &body);
    match state.engine.update(record).await {
        Ok(true) => Json(serde_json::json!({ "success": true, "message": "Schedule updated" })),
        Ok(false) => Json(serde_json::json!({ "success": false, "error": "Schedule not found" })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

pub async fn delete_schedule_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Json<serde_json::Value> {
    match state.engine.delete(&id).await {
        Ok(true) => {
            state
                .audit
                .entry(AuditApplication::Schedules, AuditAction::Delete)
                .with_id(&id)
                .save()
                .await;
            Json(serde_json::json!({ "success": true, "message": "Schedule removed" }))
        }
        Ok(false) => Json(serde_json::json!({ "success": false, "error": "Schedule not found" })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}
