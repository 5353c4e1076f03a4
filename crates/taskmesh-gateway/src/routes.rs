use crate::error::ApiError;
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use taskmesh_core::{NewTask, TaskStatus};
use taskmesh_orchestrator::{AgentSpec, AgentSummary, Runtime};
use tracing::info;
use uuid::Uuid;

type ApiResult<T> = Result<T, ApiError>;

pub(crate) async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
    }))
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

pub(crate) async fn list_agents(State(runtime): State<Arc<Runtime>>) -> Json<Value> {
    let agents: Vec<AgentSummary> = runtime
        .agents()
        .list_agents()
        .iter()
        .map(|a| AgentSummary::from(a.as_ref()))
        .collect();
    Json(json!({ "agents": agents }))
}

pub(crate) async fn get_agent(
    State(runtime): State<Arc<Runtime>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let agent = runtime
        .agents()
        .get_agent(&id)
        .ok_or_else(|| ApiError::not_found("Agent not found"))?;
    Ok(Json(json!({ "agent": AgentSummary::from(agent.as_ref()) })))
}

pub(crate) async fn register_agent(
    State(runtime): State<Arc<Runtime>>,
    body: Result<Json<AgentSpec>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(spec) = body?;
    let agent = runtime.register_agent(spec).await?;
    info!(agent_id = %agent.id(), "Agent registered over HTTP");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "agent": AgentSummary::from(agent.as_ref()) })),
    ))
}

pub(crate) async fn unregister_agent(
    State(runtime): State<Arc<Runtime>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    runtime.unregister_agent(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn agent_status(
    State(runtime): State<Arc<Runtime>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let status = runtime
        .agents()
        .agent_status(&id)
        .ok_or_else(|| ApiError::not_found("Agent not found"))?;
    Ok(Json(json!({ "status": status })))
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct TaskQuery {
    status: Option<TaskStatus>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusUpdate {
    status: TaskStatus,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

fn task_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::not_found("Task not found"))
}

pub(crate) async fn create_task(
    State(runtime): State<Arc<Runtime>>,
    body: Result<Json<NewTask>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(new_task) = body?;
    let task = runtime.create_task(new_task)?;
    Ok((StatusCode::CREATED, Json(json!({ "task": task }))))
}

pub(crate) async fn list_tasks(
    State(runtime): State<Arc<Runtime>>,
    query: Result<Query<TaskQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let tasks = runtime.tasks();
    let body = match query.status {
        Some(status) => json!({ "tasks": tasks.get_tasks_by_status(status) }),
        None => json!({
            "tasks": {
                "pending": tasks.get_tasks_by_status(TaskStatus::Pending),
                "inProgress": tasks.get_tasks_by_status(TaskStatus::InProgress),
                "completed": tasks.get_tasks_by_status(TaskStatus::Completed),
                "failed": tasks.get_tasks_by_status(TaskStatus::Failed),
                "cancelled": tasks.get_tasks_by_status(TaskStatus::Cancelled),
                "metrics": tasks.get_metrics(),
            }
        }),
    };
    Ok(Json(body))
}

pub(crate) async fn task_metrics(State(runtime): State<Arc<Runtime>>) -> Json<Value> {
    Json(json!({ "metrics": runtime.tasks().get_metrics() }))
}

pub(crate) async fn get_task(
    State(runtime): State<Arc<Runtime>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let task = runtime
        .tasks()
        .get_task(task_id(&id)?)
        .ok_or_else(|| ApiError::not_found("Task not found"))?;
    Ok(Json(json!({ "task": task })))
}

pub(crate) async fn update_task_status(
    State(runtime): State<Arc<Runtime>>,
    Path(id): Path<String>,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let id = task_id(&id)?;
    let Json(update) = body?;
    let task = runtime.update_task_status(id, update.status, update.result, update.error)?;
    Ok(Json(json!({ "success": true, "task": task })))
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

pub(crate) async fn system_status(State(runtime): State<Arc<Runtime>>) -> Json<Value> {
    Json(json!({ "status": runtime.system_status() }))
}
