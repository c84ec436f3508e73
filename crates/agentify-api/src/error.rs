use agentify_auth::AuthError;
use agentify_graph::ChatError;
use agentify_mcp::McpError;
use agentify_persist::PersistError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Mcp(#[from] McpError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

fn persist_status(err: &PersistError) -> (StatusCode, String) {
    match err {
        e if e.is_not_found() => (StatusCode::NOT_FOUND, e.to_string()),
        PersistError::Duplicate(_) => (StatusCode::CONFLICT, err.to_string()),
        e => {
            tracing::error!(error = %e, "Storage error");
            (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
        }
    }
}

impl ApiError {
    fn status(&self) -> (StatusCode, String) {
        match self {
            ApiError::MissingToken => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Auth(AuthError::Persist(e)) => persist_status(e),
            ApiError::Auth(AuthError::Validation(_)) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Auth(AuthError::InvalidConfig(msg)) => {
                tracing::error!(error = %msg, "Auth misconfigured");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            ApiError::Auth(_) => (StatusCode::UNAUTHORIZED, self.to_string()),

            ApiError::Persist(e) => persist_status(e),

            ApiError::Mcp(e) => match e {
                McpError::InvalidConfiguration(_) => (StatusCode::BAD_REQUEST, e.to_string()),
                McpError::NotFound(_) | McpError::ToolNotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
                McpError::InvalidTransition { .. } => (StatusCode::CONFLICT, e.to_string()),
                McpError::ConnectionFailed { .. } | McpError::ToolCall(_) => (StatusCode::BAD_GATEWAY, e.to_string()),
                McpError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, e.to_string()),
                McpError::Persist(inner) => persist_status(inner),
            },

            ApiError::Chat(e) => match e {
                ChatError::InvalidInput(_) => (StatusCode::BAD_REQUEST, e.to_string()),
                ChatError::ThreadNotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
                ChatError::Persist(inner) => persist_status(inner),
                ChatError::Provider(inner) => {
                    tracing::error!(error = %inner, "LLM provider error");
                    (StatusCode::BAD_GATEWAY, "LLM provider error, please retry".to_string())
                }
                ChatError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, e.to_string()),
            },

            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status();
        let body = Json(json!({ "error": message }));

        if status == StatusCode::UNAUTHORIZED {
            return (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response();
        }
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
