//! Storage for users, refresh-token sessions, chat threads, tool-server
//! descriptors and saved LLM configurations.
//!
//! The rest of the workspace only sees the store traits. Two backends ship:
//! an in-process one (always available) and MongoDB behind the `mongodb`
//! feature.

pub mod dbs;
pub mod error;
pub mod models;
pub mod traits;

pub use dbs::memory::MemoryPersistenceClient;
#[cfg(feature = "mongodb")]
pub use dbs::mongo::MongoPersistenceClient;
pub use error::{PersistError, Result};
pub use models::{
    LlmConfiguration, LlmConfigurationPatch, Message, MessageRole, NewLlmConfiguration, NewMessage, NewToolServer, NewUser, ServerAuth, ServerConfig,
    ServerType, Session, Thread, ThreadPatch, ThreadSummary, ToolServer, ToolServerPatch, User,
    DEFAULT_THREAD_TITLE,
};
pub use traits::{
    LlmConfigStore, PersistenceClient, SessionStore, Stores, ThreadStore, ToolServerStore, UserStore,
};
