//! Authentication for the chat backend.
//!
//! [`TokenAuthority`] owns credentials and the access/refresh token
//! lifecycle. [`ActivityMonitor`] applies the idle policy to a client-held
//! [`SessionContext`].

pub mod activity;
pub mod error;
pub mod password;
pub mod token;

pub use activity::{ActivityMonitor, ActivityPolicy, MonitorAction, SessionAuthority, SessionContext};
pub use error::{AuthError, Result};
pub use password::{hash_password, verify_password};
pub use token::{
    hash_refresh_token, AuthConfig, Registration, SessionMeta, TokenAuthority, TokenPair,
    UserIdentity,
};
