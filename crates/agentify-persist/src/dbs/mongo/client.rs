use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mongodb::bson::doc;
use mongodb::error::TRANSIENT_TRANSACTION_ERROR;
use mongodb::{Client, ClientSession, Database};

use crate::dbs::mongo::repositories::{
    MongoLlmConfigRepository, MongoMessageRepository, MongoSessionRepository,
    MongoThreadRepository, MongoToolServerRepository, MongoUserRepository,
};
use crate::error::{PersistError, Result};
use crate::models::{
    LlmConfiguration, LlmConfigurationPatch, Message, NewLlmConfiguration, NewMessage,
    NewToolServer, NewUser, Session, Thread, ThreadPatch, ThreadSummary, ToolServer,
    ToolServerPatch, User,
};
use crate::traits::{
    LlmConfigStore, PersistenceClient, SessionStore, ThreadStore, ToolServerStore, UserStore,
};

const MAX_TRANSACTION_ATTEMPTS: usize = 5;

/// MongoDB backend. Multi-document writes run in transactions, so the
/// deployment must be a replica set.
pub struct MongoPersistenceClient {
    client: Client,
    database: Database,
    users: MongoUserRepository,
    sessions: MongoSessionRepository,
    threads: MongoThreadRepository,
    messages: MongoMessageRepository,
    tool_servers: MongoToolServerRepository,
    llm_configs: MongoLlmConfigRepository,
}

impl MongoPersistenceClient {
    /// Connect to MongoDB and make sure the unique indexes exist.
    pub async fn connect(mongodb_uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(mongodb_uri)
            .await
            .map_err(|e| PersistError::Database(format!("connection failed: {}", e)))?;
        let db = client.database(database);

        let this = Self {
            users: MongoUserRepository::new(&db),
            sessions: MongoSessionRepository::new(&db),
            threads: MongoThreadRepository::new(&db),
            messages: MongoMessageRepository::new(&db),
            tool_servers: MongoToolServerRepository::new(&db),
            llm_configs: MongoLlmConfigRepository::new(&db),
            database: db,
            client,
        };

        this.users.ensure_indexes().await?;
        this.sessions.ensure_indexes().await?;
        this.messages.ensure_indexes().await?;
        this.llm_configs.ensure_indexes().await?;

        tracing::info!(database, "Connected to MongoDB");
        Ok(this)
    }

    async fn start_transaction(&self) -> Result<ClientSession> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;
        Ok(session)
    }

    /// One attempt at an atomic append. `Ok(None)` means another writer
    /// advanced the thread first.
    async fn try_append(
        &self,
        session: &mut ClientSession,
        thread_id: &str,
        user_id: &str,
        messages: &[NewMessage],
    ) -> Result<Option<Vec<Message>>> {
        let mut thread = self.threads.get_owned_in(thread_id, user_id, session).await?;
        let expected = thread.message_count;

        // BSON dates are millisecond precision
        let now = mongodb::bson::DateTime::from_chrono(Utc::now()).to_chrono();
        let mut created_at = now.max(thread.updated_at + Duration::milliseconds(1));
        let mut seq = expected;

        let mut stored = Vec::with_capacity(messages.len());
        for message in messages {
            seq += 1;
            stored.push(message.clone().into_message(thread_id, seq, created_at));
            created_at += Duration::milliseconds(1);
        }

        if let Some(last) = stored.last() {
            thread.message_count = seq;
            thread.updated_at = last.created_at;
        }

        if !self.threads.advance(&thread, expected, session).await? {
            return Ok(None);
        }
        self.messages.insert_batch(&stored, session).await?;
        Ok(Some(stored))
    }

    async fn try_delete_thread(
        &self,
        session: &mut ClientSession,
        thread_id: &str,
        user_id: &str,
    ) -> Result<()> {
        self.threads.delete_owned(thread_id, user_id, session).await?;
        self.messages.delete_for_thread(thread_id, session).await?;
        Ok(())
    }

    async fn try_create_llm_config(&self, session: &mut ClientSession, config: &LlmConfiguration) -> Result<()> {
        if config.is_default {
            self.llm_configs.clear_default_in(&config.user_id, &config.id, session).await?;
        }
        self.llm_configs.insert_in(config, session).await
    }

    async fn try_update_llm_config(
        &self,
        session: &mut ClientSession,
        config_id: &str,
        user_id: &str,
        patch: &LlmConfigurationPatch,
    ) -> Result<LlmConfiguration> {
        let updated = self.llm_configs.update_in(config_id, user_id, patch, session).await?;
        if patch.sets_default() {
            self.llm_configs.clear_default_in(user_id, config_id, session).await?;
        }
        Ok(updated)
    }
}

fn is_transient(err: &PersistError) -> bool {
    matches!(err, PersistError::Mongo(e) if e.contains_label(TRANSIENT_TRANSACTION_ERROR))
}

#[async_trait]
impl UserStore for MongoPersistenceClient {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        self.users.insert(user.into_user(Utc::now())).await
    }

    async fn find_user_by_login(&self, login: &str) -> Result<Option<User>> {
        self.users.find_by_login(login).await
    }

    async fn get_user(&self, user_id: &str) -> Result<User> {
        self.users.get(user_id).await
    }

    async fn record_login(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.users.record_login(user_id, at).await
    }
}

#[async_trait]
impl SessionStore for MongoPersistenceClient {
    async fn insert_session(&self, session: Session) -> Result<()> {
        self.sessions.insert(session).await
    }

    async fn consume_session(&self, token_hash: &str) -> Result<Option<Session>> {
        self.sessions.take(token_hash).await
    }

    async fn delete_session(&self, token_hash: &str, user_id: &str) -> Result<bool> {
        self.sessions.delete(token_hash, user_id).await
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        self.sessions.delete_expired(now).await
    }
}

#[async_trait]
impl ThreadStore for MongoPersistenceClient {
    async fn create_thread(&self, user_id: &str, title: Option<String>) -> Result<Thread> {
        self.threads.insert(Thread::new(user_id, title, Utc::now())).await
    }

    async fn get_thread(&self, thread_id: &str, user_id: &str) -> Result<Thread> {
        self.threads.get_owned(thread_id, user_id).await
    }

    async fn update_thread(&self, thread_id: &str, user_id: &str, patch: ThreadPatch) -> Result<Thread> {
        self.threads.update(thread_id, user_id, patch).await
    }

    async fn delete_thread(&self, thread_id: &str, user_id: &str) -> Result<()> {
        for _ in 0..MAX_TRANSACTION_ATTEMPTS {
            let mut session = self.start_transaction().await?;
            match self.try_delete_thread(&mut session, thread_id, user_id).await {
                Ok(()) => {
                    session.commit_transaction().await?;
                    return Ok(());
                }
                Err(e) if is_transient(&e) => {
                    let _ = session.abort_transaction().await;
                }
                Err(e) => {
                    let _ = session.abort_transaction().await;
                    return Err(e);
                }
            }
        }
        Err(PersistError::Database(format!("delete of thread {} kept conflicting", thread_id)))
    }

    async fn list_threads(&self, user_id: &str) -> Result<Vec<ThreadSummary>> {
        let threads = self.threads.list_active(user_id).await?;
        let mut summaries = Vec::with_capacity(threads.len());
        for thread in threads {
            let last = self.messages.last(&thread.id).await?;
            let count = thread.message_count;
            summaries.push(ThreadSummary::new(
                thread,
                count,
                last.as_ref().map(|m| m.content.as_str()),
            ));
        }
        Ok(summaries)
    }

    async fn append_messages(
        &self,
        thread_id: &str,
        user_id: &str,
        messages: Vec<NewMessage>,
    ) -> Result<Vec<Message>> {
        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            let mut session = self.start_transaction().await?;
            match self.try_append(&mut session, thread_id, user_id, &messages).await {
                Ok(Some(stored)) => {
                    session.commit_transaction().await?;
                    return Ok(stored);
                }
                Ok(None) => {
                    let _ = session.abort_transaction().await;
                    tracing::debug!(thread_id, attempt, "Append lost a race, retrying");
                }
                Err(e) if is_transient(&e) => {
                    let _ = session.abort_transaction().await;
                    tracing::debug!(thread_id, attempt, "Transient transaction error, retrying");
                }
                Err(e) => {
                    let _ = session.abort_transaction().await;
                    return Err(e);
                }
            }
        }
        Err(PersistError::Database(format!("append to thread {} kept conflicting", thread_id)))
    }

    async fn list_messages(&self, thread_id: &str, user_id: &str) -> Result<Vec<Message>> {
        self.threads.get_owned(thread_id, user_id).await?;
        self.messages.list(thread_id).await
    }

    async fn recent_messages(&self, thread_id: &str, user_id: &str, limit: usize) -> Result<Vec<Message>> {
        self.threads.get_owned(thread_id, user_id).await?;
        self.messages.recent(thread_id, limit).await
    }
}

#[async_trait]
impl ToolServerStore for MongoPersistenceClient {
    async fn insert_tool_server(&self, user_id: &str, server: NewToolServer) -> Result<ToolServer> {
        self.tool_servers.insert(server.into_tool_server(user_id, Utc::now())).await
    }

    async fn list_tool_servers(&self, user_id: &str) -> Result<Vec<ToolServer>> {
        self.tool_servers.list(user_id).await
    }

    async fn get_tool_server(&self, server_id: &str, user_id: &str) -> Result<ToolServer> {
        self.tool_servers.get_owned(server_id, user_id).await
    }

    async fn update_tool_server(
        &self,
        server_id: &str,
        user_id: &str,
        patch: ToolServerPatch,
    ) -> Result<ToolServer> {
        self.tool_servers.update(server_id, user_id, patch).await
    }

    async fn delete_tool_server(&self, server_id: &str, user_id: &str) -> Result<()> {
        self.tool_servers.delete(server_id, user_id).await
    }

    async fn set_tool_server_active(&self, server_id: &str, active: bool) -> Result<()> {
        self.tool_servers.set_active(server_id, active).await
    }

    async fn clear_active_flags(&self) -> Result<u64> {
        self.tool_servers.clear_active().await
    }
}

#[async_trait]
impl LlmConfigStore for MongoPersistenceClient {
    async fn list_llm_configs(&self, user_id: &str) -> Result<Vec<LlmConfiguration>> {
        self.llm_configs.list(user_id).await
    }

    async fn create_llm_config(&self, user_id: &str, config: NewLlmConfiguration) -> Result<LlmConfiguration> {
        let config = config.into_configuration(user_id, Utc::now());
        for _ in 0..MAX_TRANSACTION_ATTEMPTS {
            let mut session = self.start_transaction().await?;
            match self.try_create_llm_config(&mut session, &config).await {
                Ok(()) => {
                    session.commit_transaction().await?;
                    return Ok(config);
                }
                Err(e) if is_transient(&e) => {
                    let _ = session.abort_transaction().await;
                }
                Err(e) => {
                    let _ = session.abort_transaction().await;
                    return Err(e);
                }
            }
        }
        Err(PersistError::Database(format!("insert of LLM configuration {} kept conflicting", config.id)))
    }

    async fn update_llm_config(
        &self,
        config_id: &str,
        user_id: &str,
        patch: LlmConfigurationPatch,
    ) -> Result<LlmConfiguration> {
        for _ in 0..MAX_TRANSACTION_ATTEMPTS {
            let mut session = self.start_transaction().await?;
            match self.try_update_llm_config(&mut session, config_id, user_id, &patch).await {
                Ok(updated) => {
                    session.commit_transaction().await?;
                    return Ok(updated);
                }
                Err(e) if is_transient(&e) => {
                    let _ = session.abort_transaction().await;
                }
                Err(e) => {
                    let _ = session.abort_transaction().await;
                    return Err(e);
                }
            }
        }
        Err(PersistError::Database(format!("update of LLM configuration {} kept conflicting", config_id)))
    }

    async fn delete_llm_config(&self, config_id: &str, user_id: &str) -> Result<()> {
        self.llm_configs.delete(config_id, user_id).await
    }
}

#[async_trait]
impl PersistenceClient for MongoPersistenceClient {
    async fn health_check(&self) -> Result<()> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}
