use agentify_persist::PersistError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token expired")]
    Expired,

    #[error("Malformed token")]
    Malformed,

    #[error("Refresh token revoked")]
    Revoked,

    #[error("Incorrect username or password")]
    InvalidCredentials,

    #[error("Inactive user")]
    InactiveUser,

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Invalid auth configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl AuthError {
    /// Errors that should send the client back to the login screen.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            Self::Expired | Self::Malformed | Self::Revoked | Self::InactiveUser
        )
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
