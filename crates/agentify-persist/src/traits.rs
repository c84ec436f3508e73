use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::Result;
use crate::models::{
    LlmConfiguration, LlmConfigurationPatch, Message, NewLlmConfiguration, NewMessage, NewToolServer, NewUser, Session, Thread, ThreadPatch, ThreadSummary,
    ToolServer, ToolServerPatch, User,
};

/// User accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Duplicate` when the username or email is taken.
    async fn create_user(&self, user: NewUser) -> Result<User>;

    /// Looks up by username first, then by email.
    async fn find_user_by_login(&self, login: &str) -> Result<Option<User>>;

    async fn get_user(&self, user_id: &str) -> Result<User>;

    async fn record_login(&self, user_id: &str, at: DateTime<Utc>) -> Result<()>;
}

/// Refresh-token sessions, keyed by token hash.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: Session) -> Result<()>;

    /// Removes and returns the session in one step.
    ///
    /// Two concurrent callers presenting the same hash never both get `Some`.
    async fn consume_session(&self, token_hash: &str) -> Result<Option<Session>>;

    /// Removes the session only if `user_id` owns it. Returns whether a
    /// session was removed.
    async fn delete_session(&self, token_hash: &str, user_id: &str) -> Result<bool>;

    /// Deletes every session with `expires_at <= now`; returns how many.
    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Threads and their messages.
///
/// Every operation taking `user_id` treats a thread owned by someone else as
/// not found.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn create_thread(&self, user_id: &str, title: Option<String>) -> Result<Thread>;

    async fn get_thread(&self, thread_id: &str, user_id: &str) -> Result<Thread>;

    async fn update_thread(&self, thread_id: &str, user_id: &str, patch: ThreadPatch) -> Result<Thread>;

    /// Removes the thread and all its messages together.
    async fn delete_thread(&self, thread_id: &str, user_id: &str) -> Result<()>;

    /// Non-archived threads, most recently updated first.
    async fn list_threads(&self, user_id: &str) -> Result<Vec<ThreadSummary>>;

    async fn append_message(&self, thread_id: &str, user_id: &str, message: NewMessage) -> Result<Message> {
        let mut stored = self.append_messages(thread_id, user_id, vec![message]).await?;
        stored
            .pop()
            .ok_or_else(|| crate::PersistError::Internal("append produced no message".to_string()))
    }

    /// Appends all messages or none. Assigned `seq` and `created_at` are
    /// strictly increasing in input order.
    async fn append_messages(
        &self,
        thread_id: &str,
        user_id: &str,
        messages: Vec<NewMessage>,
    ) -> Result<Vec<Message>>;

    /// Full history in `seq` order.
    async fn list_messages(&self, thread_id: &str, user_id: &str) -> Result<Vec<Message>>;

    /// The last `limit` messages, still in `seq` order.
    async fn recent_messages(&self, thread_id: &str, user_id: &str, limit: usize) -> Result<Vec<Message>>;
}

/// Tool-server descriptors.
#[async_trait]
pub trait ToolServerStore: Send + Sync {
    async fn insert_tool_server(&self, user_id: &str, server: NewToolServer) -> Result<ToolServer>;

    /// Insertion order.
    async fn list_tool_servers(&self, user_id: &str) -> Result<Vec<ToolServer>>;

    async fn get_tool_server(&self, server_id: &str, user_id: &str) -> Result<ToolServer>;

    async fn update_tool_server(
        &self,
        server_id: &str,
        user_id: &str,
        patch: ToolServerPatch,
    ) -> Result<ToolServer>;

    async fn delete_tool_server(&self, server_id: &str, user_id: &str) -> Result<()>;

    async fn set_tool_server_active(&self, server_id: &str, active: bool) -> Result<()>;

    /// Clears `is_active` on every descriptor; returns how many changed.
    async fn clear_active_flags(&self) -> Result<u64>;
}

/// Saved LLM configurations, owner-scoped like threads.
///
/// Creating or updating with `is_default` set clears the flag on the user's
/// other configurations in the same step.
#[async_trait]
pub trait LlmConfigStore: Send + Sync {
    /// Default first, then newest first.
    async fn list_llm_configs(&self, user_id: &str) -> Result<Vec<LlmConfiguration>>;

    async fn create_llm_config(&self, user_id: &str, config: NewLlmConfiguration) -> Result<LlmConfiguration>;

    async fn update_llm_config(
        &self,
        config_id: &str,
        user_id: &str,
        patch: LlmConfigurationPatch,
    ) -> Result<LlmConfiguration>;

    async fn delete_llm_config(&self, config_id: &str, user_id: &str) -> Result<()>;
}

/// A complete storage backend.
#[async_trait]
pub trait PersistenceClient: UserStore + SessionStore + ThreadStore + ToolServerStore + LlmConfigStore {
    async fn health_check(&self) -> Result<()>;
}

/// The per-concern handles the rest of the system depends on.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub threads: Arc<dyn ThreadStore>,
    pub tool_servers: Arc<dyn ToolServerStore>,
    pub llm_configs: Arc<dyn LlmConfigStore>,
}

impl Stores {
    pub fn from_client<C>(client: Arc<C>) -> Self
    where
        C: PersistenceClient + 'static,
    {
        Self {
            users: client.clone(),
            sessions: client.clone(),
            threads: client.clone(),
            tool_servers: client.clone(),
            llm_configs: client,
        }
    }
}
