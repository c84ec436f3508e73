pub mod auth;
pub mod logging;

pub use auth::{AuthUser, ClientMeta};
