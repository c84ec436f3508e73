use agentify_persist::{Message, Thread, ThreadPatch, ThreadSummary};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CreateThreadRequest {
    /// Defaults to "New Chat".
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateThreadRequest {
    pub title: Option<String>,
    pub is_archived: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ThreadResponse {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_archived: bool,
    pub message_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_preview: Option<String>,
}

impl From<Thread> for ThreadResponse {
    fn from(thread: Thread) -> Self {
        Self {
            id: thread.id,
            title: thread.title,
            created_at: thread.created_at,
            updated_at: thread.updated_at,
            is_archived: thread.is_archived,
            message_count: thread.message_count,
            last_message_preview: None,
        }
    }
}

impl From<ThreadSummary> for ThreadResponse {
    fn from(summary: ThreadSummary) -> Self {
        Self {
            message_count: summary.message_count,
            last_message_preview: summary.last_message_preview,
            ..ThreadResponse::from(summary.thread)
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub id: String,
    pub thread_id: String,
    pub seq: u64,
    /// user, assistant, system or tool
    pub role: String,
    pub content: String,
    #[schema(value_type = Option<Object>)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            thread_id: message.thread_id,
            seq: message.seq,
            role: message.role.to_string(),
            content: message.content,
            tool_calls: message.tool_calls,
            tool_call_id: message.tool_call_id,
            created_at: message.created_at,
        }
    }
}

/// List the caller's threads, most recently active first
#[utoipa::path(
    get,
    path = "/api/threads",
    responses(
        (status = 200, description = "Non-archived threads", body = Vec<ThreadResponse>),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = [])),
    tag = "threads"
)]
pub async fn list_threads(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<Json<Vec<ThreadResponse>>> {
    let threads = state.stores.threads.list_threads(user.id()).await?;
    Ok(Json(threads.into_iter().map(ThreadResponse::from).collect()))
}

/// Create an empty thread
#[utoipa::path(
    post,
    path = "/api/threads",
    request_body = CreateThreadRequest,
    responses(
        (status = 201, description = "Thread created", body = ThreadResponse),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = [])),
    tag = "threads"
)]
pub async fn create_thread(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateThreadRequest>,
) -> ApiResult<(StatusCode, Json<ThreadResponse>)> {
    let thread = state.stores.threads.create_thread(user.id(), req.title).await?;
    tracing::info!(user_id = %user.id(), thread_id = %thread.id, "Thread created");
    Ok((StatusCode::CREATED, Json(thread.into())))
}

/// Rename or archive a thread
#[utoipa::path(
    patch,
    path = "/api/threads/{thread_id}",
    params(("thread_id" = String, Path, description = "Thread id")),
    request_body = UpdateThreadRequest,
    responses(
        (status = 200, description = "Updated thread", body = ThreadResponse),
        (status = 400, description = "Empty title"),
        (status = 404, description = "Thread not found")
    ),
    security(("bearer_auth" = [])),
    tag = "threads"
)]
pub async fn update_thread(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(thread_id): Path<String>,
    Json(req): Json<UpdateThreadRequest>,
) -> ApiResult<Json<ThreadResponse>> {
    let title = match req.title {
        Some(title) if title.trim().is_empty() => {
            return Err(ApiError::BadRequest("title must not be empty".into()));
        }
        other => other.map(|t| t.trim().to_string()),
    };

    let thread = state
        .stores
        .threads
        .update_thread(&thread_id, user.id(), ThreadPatch { title, is_archived: req.is_archived })
        .await?;
    Ok(Json(thread.into()))
}

/// Delete a thread and its messages
#[utoipa::path(
    delete,
    path = "/api/threads/{thread_id}",
    params(("thread_id" = String, Path, description = "Thread id")),
    responses(
        (status = 204, description = "Thread deleted"),
        (status = 404, description = "Thread not found")
    ),
    security(("bearer_auth" = [])),
    tag = "threads"
)]
pub async fn delete_thread(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(thread_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.stores.threads.delete_thread(&thread_id, user.id()).await?;
    tracing::info!(user_id = %user.id(), thread_id = %thread_id, "Thread deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Full message history of a thread
#[utoipa::path(
    get,
    path = "/api/threads/{thread_id}/messages",
    params(("thread_id" = String, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Messages in order", body = Vec<MessageResponse>),
        (status = 404, description = "Thread not found")
    ),
    security(("bearer_auth" = [])),
    tag = "threads"
)]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(thread_id): Path<String>,
) -> ApiResult<Json<Vec<MessageResponse>>> {
    let messages = state.stores.threads.list_messages(&thread_id, user.id()).await?;
    Ok(Json(messages.into_iter().map(MessageResponse::from).collect()))
}
