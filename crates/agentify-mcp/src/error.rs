use agentify_persist::PersistError;
use thiserror::Error;

use crate::connector::ConnectionState;

#[derive(Error, Debug)]
pub enum McpError {
    #[error("Invalid server configuration: {0}")]
    InvalidConfiguration(String),

    /// Absent or owned by another user; the two are not distinguished.
    #[error("Tool server not found: {0}")]
    NotFound(String),

    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Cannot go from {from} to {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool call failed: {0}")]
    ToolCall(String),

    #[error(transparent)]
    Persist(PersistError),
}

impl From<PersistError> for McpError {
    fn from(err: PersistError) -> Self {
        match err {
            PersistError::ToolServerNotFound(id) => Self::NotFound(id),
            other => Self::Persist(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, McpError>;
