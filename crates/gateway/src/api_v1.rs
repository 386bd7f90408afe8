//! HTTP API v1: chat over the agent loop.
//!
//! Endpoints (all behind bearer auth):
//!
//! - `POST /v1/chat`: send a message, get the reply
//! - `GET  /v1/conversations/{id}/turns`: recent turns of one conversation
//! - `GET  /v1/tools`: tool specs the model is offered
//! - `GET  /v1/tasks`, `POST /v1/tasks`: list or create the caller's tasks
//! - `PUT  /v1/tasks/{id}`, `DELETE /v1/tasks/{id}`: edit or remove one task
//! - `GET  /v1/stats`: completed and pending counts

use axum::{
    Extension, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use taskmate_agent::{AgentStatus, ChatService};
use taskmate_core::error::{Error, StoreError};
use taskmate_core::identity::UserIdentity;
use taskmate_core::task::{NewTask, TaskFilter, TaskPatch, TaskRepository, TaskStatusFilter};
use taskmate_core::tool::ToolSpec;
use taskmate_core::turn::{ConversationId, Turn};

const DEFAULT_TURNS_LIMIT: usize = 50;
const MAX_TURNS_LIMIT: usize = 500;

/// Shared state for the v1 API.
pub struct ApiV1State {
    pub chat: Arc<ChatService>,
    pub tasks: Arc<dyn TaskRepository>,
}

pub type SharedApiState = Arc<ApiV1State>;

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/conversations/{id}/turns", get(turns_handler))
        .route("/tools", get(list_tools_handler))
        .route("/tasks", get(list_tasks_handler).post(create_task_handler))
        .route("/tasks/{id}", put(update_task_handler).delete(delete_task_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
}

// ── Errors ────────────────────────────────────────────────────────────────

/// Maps domain errors to HTTP responses.
pub enum ApiError {
    Domain(Error),
    BadRequest(String),
    TaskNotFound(i64),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Domain(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Domain(Error::Store(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let e = match self {
            ApiError::Domain(e) => e,
            ApiError::BadRequest(message) => {
                return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": message })))
                    .into_response();
            }
            ApiError::TaskNotFound(id) => {
                let message = format!("task {id} not found");
                return (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": message })))
                    .into_response();
            }
        };

        let status = match e.root() {
            Error::EmptyMessage => StatusCode::BAD_REQUEST,
            Error::ConversationNotFound(_) => StatusCode::NOT_FOUND,
            Error::Gateway(_) => StatusCode::BAD_GATEWAY,
            Error::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %e, "Request failed");
            "internal error".to_string()
        } else {
            e.to_string()
        };
        let body = match e.conversation_id() {
            // the turns so far were saved; let the client continue from them
            Some(id) => serde_json::json!({ "error": message, "conversation_id": id }),
            None => serde_json::json!({ "error": message }),
        };
        (status, Json(body)).into_response()
    }
}

// ── Chat ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub conversation_id: String,
    pub status: AgentStatus,
    pub iterations: u32,
}

/// `POST /v1/chat`
///
/// The request runs on its own task. If the client goes away the handler
/// future is dropped, the token fires and the loop stops at the next
/// suspension point, persisting what it has so far.
async fn chat_handler(
    State(state): State<SharedApiState>,
    Extension(identity): Extension<UserIdentity>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    info!(user = %identity, message_len = req.message.len(), "Chat request received");

    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let chat = state.chat.clone();
    let conversation_id = req.conversation_id.map(ConversationId);
    let message = req.message;

    let task = tokio::spawn(async move {
        chat.send_until_cancelled(&identity, conversation_id.as_ref(), &message, &cancel)
            .await
    });
    let joined = task.await;
    guard.disarm();

    let reply = joined.map_err(|e| Error::Internal(format!("chat task failed: {e}")))??;
    Ok(Json(ChatResponse {
        response: reply.text,
        conversation_id: reply.conversation_id.to_string(),
        status: reply.status,
        iterations: reply.iterations,
    }))
}

// ── Conversations ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct TurnsQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
struct TurnsResponse {
    conversation_id: String,
    turns: Vec<Turn>,
}

/// `GET /v1/conversations/{id}/turns`
async fn turns_handler(
    State(state): State<SharedApiState>,
    Extension(identity): Extension<UserIdentity>,
    Path(id): Path<String>,
    Query(query): Query<TurnsQuery>,
) -> Result<Json<TurnsResponse>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_TURNS_LIMIT)
        .min(MAX_TURNS_LIMIT);
    let conversation_id = ConversationId(id);
    let turns = state
        .chat
        .history(&identity, &conversation_id, limit)
        .await?;

    Ok(Json(TurnsResponse {
        conversation_id: conversation_id.to_string(),
        turns,
    }))
}

// ── Tools ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ToolsResponse {
    tools: Vec<ToolSpec>,
}

/// `GET /v1/tools`
async fn list_tools_handler(State(state): State<SharedApiState>) -> Json<ToolsResponse> {
    Json(ToolsResponse {
        tools: state.chat.tool_specs(),
    })
}

// ── Tasks ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct TasksQuery {
    pub category: Option<String>,
    pub status: Option<String>,
}

#[derive(Serialize)]
struct TasksResponse {
    tasks: Vec<serde_json::Value>,
}

/// `GET /v1/tasks?category=..&status=..`
async fn list_tasks_handler(
    State(state): State<SharedApiState>,
    Extension(identity): Extension<UserIdentity>,
    Query(query): Query<TasksQuery>,
) -> Result<Json<TasksResponse>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<TaskStatusFilter>)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let filter = TaskFilter {
        category: query.category,
        status,
    };
    let tasks = state.tasks.list(&identity, &filter).await?;
    Ok(Json(TasksResponse {
        tasks: tasks.iter().map(|t| t.to_json()).collect(),
    }))
}

/// `POST /v1/tasks`
async fn create_task_handler(
    State(state): State<SharedApiState>,
    Extension(identity): Extension<UserIdentity>,
    Json(mut task): Json<NewTask>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    task.title = task.title.trim().to_string();
    if task.title.is_empty() {
        return Err(ApiError::BadRequest("title cannot be empty".into()));
    }
    let created = state.tasks.create(&identity, task).await?;
    info!(user = %identity, task_id = created.id, "Task created over HTTP");
    Ok((StatusCode::CREATED, Json(created.to_json())))
}

#[derive(Deserialize)]
pub struct TaskUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub completed: Option<bool>,
}

/// `PUT /v1/tasks/{id}`: only the fields present are changed.
async fn update_task_handler(
    State(state): State<SharedApiState>,
    Extension(identity): Extension<UserIdentity>,
    Path(id): Path<i64>,
    Json(req): Json<TaskUpdateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let title = req.title.map(|t| t.trim().to_string());
    if title.as_deref() == Some("") {
        return Err(ApiError::BadRequest("title cannot be empty".into()));
    }
    let patch = TaskPatch {
        title,
        description: req.description,
        category: req.category,
        completed: req.completed,
    };
    if patch.is_empty() {
        return Err(ApiError::BadRequest("nothing to update".into()));
    }

    match state.tasks.update(&identity, id, &patch).await? {
        Some(task) => Ok(Json(task.to_json())),
        None => Err(ApiError::TaskNotFound(id)),
    }
}

/// `DELETE /v1/tasks/{id}`
async fn delete_task_handler(
    State(state): State<SharedApiState>,
    Extension(identity): Extension<UserIdentity>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let deleted = state.tasks.delete(&identity, &[id]).await?;
    if deleted.is_empty() {
        return Err(ApiError::TaskNotFound(id));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    total: usize,
    completed: usize,
    pending: usize,
}

/// `GET /v1/stats`
async fn stats_handler(
    State(state): State<SharedApiState>,
    Extension(identity): Extension<UserIdentity>,
) -> Result<Json<StatsResponse>, ApiError> {
    let tasks = state.tasks.list(&identity, &TaskFilter::default()).await?;
    let completed = tasks.iter().filter(|t| t.completed).count();
    Ok(Json(StatsResponse {
        total: tasks.len(),
        completed,
        pending: tasks.len() - completed,
    }))
}
