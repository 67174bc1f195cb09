use axum::{Json, extract::State};

use super::super::AppState;

pub async fn list_agents_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    let agents: Vec<serde_json::Value> = state
        .fleet
        .list()
        .await
        .iter()
        .map(|a| {
            serde_json::json!({
                "id": a.id,
                "groups": a.groups,
                "push_enabled": a.push_enabled,
            })
        })
        .collect();

    Json(serde_json::json!({ "success": true, "agents": agents }))
}
