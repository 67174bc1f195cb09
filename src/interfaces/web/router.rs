use axum::{
    Json, Router,
    http::{HeaderValue, Method},
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::handlers::{agents, auditlog, commands, dispatch, jobs, schedules, watch};

fn build_localhost_cors(api_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", api_port),
        format!("http://localhost:{}", api_port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(tower_http::cors::Any)
}

async fn health_endpoint() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "success": true, "status": "ok" }))
}

pub fn build_api_router(state: AppState) -> Router {
    let cors = build_localhost_cors(state.api_port);

    Router::new()
        .route("/api/health", get(health_endpoint))
        .route("/api/agents", get(agents::list_agents_endpoint))
        .route("/api/push", post(dispatch::push_file_endpoint))
        .route("/api/run", post(dispatch::run_command_endpoint))
        .route("/api/multijobs", get(jobs::list_multi_jobs_endpoint))
        .route("/api/multijobs/{jid}", get(jobs::get_multi_job_endpoint))
        .route("/api/jobs", get(jobs::list_jobs_endpoint))
        .route(
            "/api/schedules",
            get(schedules::list_schedules_endpoint).post(schedules::create_schedule_endpoint),
        )
        .route(
            "/api/schedules/{id}",
            get(schedules::get_schedule_endpoint)
                .put(schedules::update_schedule_endpoint)
                .delete(schedules::delete_schedule_endpoint),
        )
        .route(
            "/api/commands",
            get(commands::list_commands_endpoint).post(commands::save_command_endpoint),
        )
        .route(
            "/api/commands/{id}",
            get(commands::get_command_endpoint)
                .put(commands::update_command_endpoint)
                .delete(commands::delete_command_endpoint),
        )
        .route("/api/auditlog", get(auditlog::list_audit_entries_endpoint))
        .route("/api/ws/dispatches", get(watch::watch_dispatches_ws))
        .route("/api/logs/stream", get(super::sse_logs_endpoint))
        .layer(cors)
        .with_state(state)
}
