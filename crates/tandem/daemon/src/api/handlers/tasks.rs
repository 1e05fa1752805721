//! Protocol, task and assignment handlers

use crate::api::auth::Bearer;
use crate::api::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tandem_core::CoordinatorApi;
use tandem_types::wire::{
    DeclareProtocolResponse, ReportStatusRequest, TaskStatusResponse, WaitTaskRequest,
};
use tandem_types::{Assignment, EntryKey, ProtocolSpec, RunTaskRequest, Task, TaskId};

/// Long-poll query parameters
#[derive(Debug, Default, Deserialize)]
pub struct TimeoutQuery {
    pub timeout_ms: Option<u64>,
}

/// Declare a protocol
pub async fn declare_protocol(
    State(state): State<AppState>,
    Bearer(credential): Bearer,
    Json(spec): Json<ProtocolSpec>,
) -> ApiResult<Json<DeclareProtocolResponse>> {
    let name = spec.name.clone();
    let created = state.coordinator.declare_protocol(&credential, spec).await?;
    Ok(Json(DeclareProtocolResponse { name, created }))
}

/// Start a task. With `options.synchronous` the response is sent once the
/// task is terminal.
pub async fn run_task(
    State(state): State<AppState>,
    Bearer(credential): Bearer,
    Json(request): Json<RunTaskRequest>,
) -> ApiResult<(StatusCode, Json<TaskStatusResponse>)> {
    let task_id = state.coordinator.run_task(&credential, request).await?;
    let task = state.coordinator.get_task(&credential, task_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(TaskStatusResponse {
            task_id,
            status: task.status,
        }),
    ))
}

/// Get a task record
pub async fn get_task(
    State(state): State<AppState>,
    Bearer(credential): Bearer,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Task>> {
    let task_id = TaskId::parse(&task_id)?;
    let task = state.coordinator.get_task(&credential, task_id).await?;
    Ok(Json(task))
}

/// Block until the task is terminal, at most `max_wait`
pub async fn wait_task(
    State(state): State<AppState>,
    Bearer(credential): Bearer,
    Path(task_id): Path<String>,
    Json(request): Json<WaitTaskRequest>,
) -> ApiResult<Json<TaskStatusResponse>> {
    let task_id = TaskId::parse(&task_id)?;
    let limit = state.wait_limit(request.timeout_ms);
    let status = state
        .coordinator
        .wait_task(&credential, task_id, Some(limit))
        .await?;
    Ok(Json(TaskStatusResponse { task_id, status }))
}

/// Report the caller's own outcome
pub async fn report_status(
    State(state): State<AppState>,
    Bearer(credential): Bearer,
    Path(task_id): Path<String>,
    Json(request): Json<ReportStatusRequest>,
) -> ApiResult<Json<TaskStatusResponse>> {
    let task_id = TaskId::parse(&task_id)?;
    let status = state
        .coordinator
        .report_status(&credential, task_id, request.status, request.reason)
        .await?;
    Ok(Json(TaskStatusResponse { task_id, status }))
}

/// Extend the caller's liveness deadline
pub async fn heartbeat(
    State(state): State<AppState>,
    Bearer(credential): Bearer,
    Path(task_id): Path<String>,
) -> ApiResult<StatusCode> {
    let task_id = TaskId::parse(&task_id)?;
    state.coordinator.heartbeat(&credential, task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Keys written in a task's scope
pub async fn list_entries(
    State(state): State<AppState>,
    Bearer(credential): Bearer,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Vec<EntryKey>>> {
    let task_id = TaskId::parse(&task_id)?;
    let keys = state.coordinator.list_entries(&credential, task_id).await?;
    Ok(Json(keys))
}

/// Long-poll for the caller's next assignment; `null` when none arrived
pub async fn claim_assignment(
    State(state): State<AppState>,
    Bearer(credential): Bearer,
    Query(query): Query<TimeoutQuery>,
) -> ApiResult<Json<Option<Assignment>>> {
    let limit = state.wait_limit(query.timeout_ms);
    let assignment = state
        .coordinator
        .claim_assignment(&credential, Some(limit))
        .await?;
    Ok(Json(assignment))
}
