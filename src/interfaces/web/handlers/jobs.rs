use axum::{
    Json,
    extract::{Path, Query, State},
};
use std::collections::HashMap;

use super::super::AppState;
use crate::core::store::query::ListOptions;

const MULTI_JOB_FIELDS: &[&str] = &["jid", "schedule_id", "created_at", "started_at"];
const JOB_FIELDS: &[&str] = &[
    "job_id",
    "multi_job_id",
    "agent_id",
    "status",
    "started_at",
    "finished_at",
];

pub async fn list_multi_jobs_endpoint(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let options = match ListOptions::from_query(&params, MULTI_JOB_FIELDS) {
        Ok(options) => options,
        Err(e) => {
            return Json(serde_json::json!({ "success": false, "error": e.to_string() }));
        }
    };

    match state.store.list_multi_jobs(&options).await {
        Ok(multi_jobs) => {
            Json(serde_json::json!({ "success": true, "multi_jobs": multi_jobs }))
        }
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

pub async fn get_multi_job_endpoint(
    Path(jid): Path<String>,
    State(state): State<AppState>,
) -> Json<serde_json::Value> {
    let multi_job = match state.store.get_multi_job(&jid).await {
        Ok(Some(multi_job)) => multi_job,
        Ok(None) => {
            return Json(serde_json::json!({ "success": false, "error": "Multi-job not found" }));
        }
        Err(e) => {
            return Json(serde_json::json!({ "success": false, "error": e.to_string() }));
        }
    };

    match state.store.list_jobs_for_multi_job(&jid).await {
        Ok(jobs) => Json(serde_json::json!({
            "success": true,
            "multi_job": multi_job,
            "jobs": jobs,
        })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

pub async fn list_jobs_endpoint(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let options = match ListOptions::from_query(&params, JOB_FIELDS) {
        Ok(options) => options,
        Err(e) => {
            return Json(serde_json::json!({ "success": false, "error": e.to_string() }));
        }
    };

    match state.store.list_jobs(&options).await {
        Ok(jobs) => Json(serde_json::json!({ "success": true, "jobs": jobs })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}
