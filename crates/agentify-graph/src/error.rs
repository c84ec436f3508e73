use agentify_persist::PersistError;
use std::time::Duration;
use thiserror::Error;

/// Why a chat turn failed.
///
/// `Provider` and `Timeout` happen after the user message was stored; the
/// caller may simply resend.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Persistence error: {0}")]
    Persist(PersistError),

    #[error("LLM provider error: {0}")]
    Provider(#[source] anyhow::Error),

    #[error("LLM provider timed out after {0:?}")]
    Timeout(Duration),
}

impl ChatError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(_) | Self::Timeout(_))
    }
}

impl From<PersistError> for ChatError {
    fn from(err: PersistError) -> Self {
        match err {
            PersistError::ThreadNotFound(id) => Self::ThreadNotFound(id),
            other => Self::Persist(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
