use axum::{
    Json,
    extract::{Query, State},
};

use super::super::AppState;

#[derive(serde::Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

pub async fn list_audit_entries_endpoint(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Json<serde_json::Value> {
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    match state.audit.list_recent(limit).await {
        Ok(entries) => Json(serde_json::json!({ "success": true, "entries": entries })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}
