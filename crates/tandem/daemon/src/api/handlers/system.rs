//! Health handler

use crate::api::state::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
    pub endpoint: String,
    pub registry_backend: String,
    pub tasks: TaskCounts,
}

/// Tasks currently held by the coordinator
#[derive(Debug, Serialize)]
pub struct TaskCounts {
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    let stats = state.coordinator.tasks().stats();
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
        endpoint: state.coordinator.endpoint().to_string(),
        registry_backend: state.coordinator.registry().backend_kind().to_string(),
        tasks: TaskCounts {
            running: stats.running,
            completed: stats.completed,
            failed: stats.failed,
        },
    })
}
