use thiserror::Error;

/// Storage failures.
///
/// The `*NotFound` variants cover both "absent" and "owned by another user";
/// callers cannot tell the two apart.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Tool server not found: {0}")]
    ToolServerNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("LLM configuration not found: {0}")]
    LlmConfigNotFound(String),

    #[error("Already exists: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "mongodb")]
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[cfg(feature = "mongodb")]
    #[error("BSON serialization error: {0}")]
    BsonSerialization(#[from] bson::ser::Error),

    #[cfg(feature = "mongodb")]
    #[error("BSON deserialization error: {0}")]
    BsonDeserialization(#[from] bson::de::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PersistError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ThreadNotFound(_)
                | Self::ToolServerNotFound(_)
                | Self::UserNotFound(_)
                | Self::LlmConfigNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PersistError>;
