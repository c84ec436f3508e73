use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::ApiResult;
use crate::middleware::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub message: String,
    /// Omit to start a new thread titled after the message.
    pub thread_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    pub response: String,
    pub thread_id: String,
    pub thread_title: String,
    pub message_id: String,
}

/// Send a message and get the assistant's reply
///
/// The message is stored first. If the model call then fails the request
/// can be resent; no partial reply is stored.
#[utoipa::path(
    post,
    path = "/api/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Assistant reply", body = ChatResponse),
        (status = 400, description = "Empty message"),
        (status = 404, description = "Thread not found"),
        (status = 502, description = "LLM provider failed, safe to retry"),
        (status = 504, description = "LLM provider timed out, safe to retry")
    ),
    security(("bearer_auth" = [])),
    tag = "chat"
)]
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let outcome = state
        .chat
        .handle(user.id(), &req.message, req.thread_id.as_deref())
        .await?;

    Ok(Json(ChatResponse {
        response: outcome.response,
        thread_id: outcome.thread_id,
        thread_title: outcome.thread_title,
        message_id: outcome.message_id,
    }))
}
