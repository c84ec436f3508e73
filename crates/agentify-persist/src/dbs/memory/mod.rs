use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{PersistError, Result};
use crate::models::{
    sort_for_listing, LlmConfiguration, LlmConfigurationPatch, Message, NewLlmConfiguration,
    NewMessage, NewToolServer, NewUser, Session, Thread, ThreadPatch, ThreadSummary, ToolServer,
    ToolServerPatch, User,
};
use crate::traits::{
    LlmConfigStore, PersistenceClient, SessionStore, ThreadStore, ToolServerStore, UserStore,
};

#[derive(Default)]
struct State {
    users: HashMap<String, User>,
    sessions: HashMap<String, Session>,
    threads: HashMap<String, Thread>,
    messages: HashMap<String, Vec<Message>>,
    tool_servers: Vec<ToolServer>,
    llm_configs: Vec<LlmConfiguration>,
    last_created_at: Option<DateTime<Utc>>,
}

impl State {
    /// Strictly increasing timestamp, even when the clock stalls.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last_created_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(next);
        next
    }

    fn owned_thread_mut(&mut self, thread_id: &str, user_id: &str) -> Result<&mut Thread> {
        self.threads
            .get_mut(thread_id)
            .filter(|t| t.user_id == user_id)
            .ok_or_else(|| PersistError::ThreadNotFound(thread_id.to_string()))
    }

    fn owned_thread(&self, thread_id: &str, user_id: &str) -> Result<&Thread> {
        self.threads
            .get(thread_id)
            .filter(|t| t.user_id == user_id)
            .ok_or_else(|| PersistError::ThreadNotFound(thread_id.to_string()))
    }

    fn owned_server_mut(&mut self, server_id: &str, user_id: &str) -> Result<&mut ToolServer> {
        self.tool_servers
            .iter_mut()
            .find(|s| s.id == server_id && s.user_id == user_id)
            .ok_or_else(|| PersistError::ToolServerNotFound(server_id.to_string()))
    }

    fn clear_default_except(&mut self, user_id: &str, keep: &str) {
        for config in self
            .llm_configs
            .iter_mut()
            .filter(|c| c.user_id == user_id && c.id != keep)
        {
            config.is_default = false;
        }
    }
}

/// Process-local backend. A single lock over all state makes every
/// operation atomic, including batch appends and cascading deletes.
#[derive(Default)]
pub struct MemoryPersistenceClient {
    state: RwLock<State>,
}

impl MemoryPersistenceClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryPersistenceClient {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut state = self.state.write().await;
        let taken = state
            .users
            .values()
            .any(|u| u.username == user.username || u.email == user.email);
        if taken {
            return Err(PersistError::Duplicate("username or email already registered".to_string()));
        }

        let user = user.into_user(Utc::now());
        state.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn find_user_by_login(&self, login: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        let by_username = state.users.values().find(|u| u.username == login);
        Ok(by_username
            .or_else(|| state.users.values().find(|u| u.email == login))
            .cloned())
    }

    async fn get_user(&self, user_id: &str) -> Result<User> {
        self.state
            .read()
            .await
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| PersistError::UserNotFound(user_id.to_string()))
    }

    async fn record_login(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| PersistError::UserNotFound(user_id.to_string()))?;
        user.last_login = Some(at);
        user.updated_at = at;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryPersistenceClient {
    async fn insert_session(&self, session: Session) -> Result<()> {
        let mut state = self.state.write().await;
        state.sessions.insert(session.token_hash.clone(), session);
        Ok(())
    }

    async fn consume_session(&self, token_hash: &str) -> Result<Option<Session>> {
        Ok(self.state.write().await.sessions.remove(token_hash))
    }

    async fn delete_session(&self, token_hash: &str, user_id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let owned = state.sessions.get(token_hash).is_some_and(|s| s.user_id == user_id);
        if owned {
            state.sessions.remove(token_hash);
        }
        Ok(owned)
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| !s.is_expired(now));
        Ok((before - state.sessions.len()) as u64)
    }
}

#[async_trait]
impl ThreadStore for MemoryPersistenceClient {
    async fn create_thread(&self, user_id: &str, title: Option<String>) -> Result<Thread> {
        let mut state = self.state.write().await;
        let now = state.next_timestamp();
        let thread = Thread::new(user_id, title, now);
        state.messages.insert(thread.id.clone(), Vec::new());
        state.threads.insert(thread.id.clone(), thread.clone());
        Ok(thread)
    }

    async fn get_thread(&self, thread_id: &str, user_id: &str) -> Result<Thread> {
        let state = self.state.read().await;
        state.owned_thread(thread_id, user_id).cloned()
    }

    async fn update_thread(&self, thread_id: &str, user_id: &str, patch: ThreadPatch) -> Result<Thread> {
        let mut state = self.state.write().await;
        let thread = state.owned_thread_mut(thread_id, user_id)?;
        if let Some(title) = patch.title {
            thread.title = title;
        }
        if let Some(archived) = patch.is_archived {
            thread.is_archived = archived;
        }
        thread.updated_at = Utc::now().max(thread.updated_at);
        Ok(thread.clone())
    }

    async fn delete_thread(&self, thread_id: &str, user_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.owned_thread(thread_id, user_id)?;
        state.threads.remove(thread_id);
        state.messages.remove(thread_id);
        Ok(())
    }

    async fn list_threads(&self, user_id: &str) -> Result<Vec<ThreadSummary>> {
        let state = self.state.read().await;
        let mut threads: Vec<&Thread> = state
            .threads
            .values()
            .filter(|t| t.user_id == user_id && !t.is_archived)
            .collect();
        threads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Ok(threads
            .into_iter()
            .map(|t| {
                let messages = state.messages.get(&t.id);
                let count = messages.map_or(0, |m| m.len() as u64);
                let last = messages.and_then(|m| m.last()).map(|m| m.content.as_str());
                ThreadSummary::new(t.clone(), count, last)
            })
            .collect())
    }

    async fn append_messages(
        &self,
        thread_id: &str,
        user_id: &str,
        messages: Vec<NewMessage>,
    ) -> Result<Vec<Message>> {
        let mut state = self.state.write().await;
        let mut seq = state.owned_thread(thread_id, user_id)?.message_count;

        let mut stored = Vec::with_capacity(messages.len());
        for message in messages {
            seq += 1;
            let created_at = state.next_timestamp();
            stored.push(message.into_message(thread_id, seq, created_at));
        }

        if let Some(last) = stored.last() {
            let updated_at = last.created_at;
            let thread = state.owned_thread_mut(thread_id, user_id)?;
            thread.message_count = seq;
            thread.updated_at = updated_at;
        }
        state
            .messages
            .entry(thread_id.to_string())
            .or_default()
            .extend(stored.iter().cloned());

        Ok(stored)
    }

    async fn list_messages(&self, thread_id: &str, user_id: &str) -> Result<Vec<Message>> {
        let state = self.state.read().await;
        state.owned_thread(thread_id, user_id)?;
        Ok(state.messages.get(thread_id).cloned().unwrap_or_default())
    }

    async fn recent_messages(&self, thread_id: &str, user_id: &str, limit: usize) -> Result<Vec<Message>> {
        let state = self.state.read().await;
        state.owned_thread(thread_id, user_id)?;
        let messages = state.messages.get(thread_id).map(Vec::as_slice).unwrap_or_default();
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }
}

#[async_trait]
impl ToolServerStore for MemoryPersistenceClient {
    async fn insert_tool_server(&self, user_id: &str, server: NewToolServer) -> Result<ToolServer> {
        let mut state = self.state.write().await;
        let server = server.into_tool_server(user_id, Utc::now());
        state.tool_servers.push(server.clone());
        Ok(server)
    }

    async fn list_tool_servers(&self, user_id: &str) -> Result<Vec<ToolServer>> {
        let state = self.state.read().await;
        Ok(state
            .tool_servers
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_tool_server(&self, server_id: &str, user_id: &str) -> Result<ToolServer> {
        let state = self.state.read().await;
        state
            .tool_servers
            .iter()
            .find(|s| s.id == server_id && s.user_id == user_id)
            .cloned()
            .ok_or_else(|| PersistError::ToolServerNotFound(server_id.to_string()))
    }

    async fn update_tool_server(
        &self,
        server_id: &str,
        user_id: &str,
        patch: ToolServerPatch,
    ) -> Result<ToolServer> {
        let mut state = self.state.write().await;
        let server = state.owned_server_mut(server_id, user_id)?;
        patch.apply(server, Utc::now());
        Ok(server.clone())
    }

    async fn delete_tool_server(&self, server_id: &str, user_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let before = state.tool_servers.len();
        state
            .tool_servers
            .retain(|s| !(s.id == server_id && s.user_id == user_id));
        if state.tool_servers.len() == before {
            return Err(PersistError::ToolServerNotFound(server_id.to_string()));
        }
        Ok(())
    }

    async fn set_tool_server_active(&self, server_id: &str, active: bool) -> Result<()> {
        let mut state = self.state.write().await;
        let server = state
            .tool_servers
            .iter_mut()
            .find(|s| s.id == server_id)
            .ok_or_else(|| PersistError::ToolServerNotFound(server_id.to_string()))?;
        server.is_active = active;
        server.updated_at = Utc::now();
        Ok(())
    }

    async fn clear_active_flags(&self) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut cleared = 0;
        for server in state.tool_servers.iter_mut().filter(|s| s.is_active) {
            server.is_active = false;
            cleared += 1;
        }
        Ok(cleared)
    }
}

#[async_trait]
impl LlmConfigStore for MemoryPersistenceClient {
    async fn list_llm_configs(&self, user_id: &str) -> Result<Vec<LlmConfiguration>> {
        let state = self.state.read().await;
        let mut configs: Vec<LlmConfiguration> = state
            .llm_configs
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        sort_for_listing(&mut configs);
        Ok(configs)
    }

    async fn create_llm_config(&self, user_id: &str, config: NewLlmConfiguration) -> Result<LlmConfiguration> {
        let mut state = self.state.write().await;
        let now = state.next_timestamp();
        let config = config.into_configuration(user_id, now);
        if config.is_default {
            state.clear_default_except(user_id, &config.id);
        }
        state.llm_configs.push(config.clone());
        Ok(config)
    }

    async fn update_llm_config(
        &self,
        config_id: &str,
        user_id: &str,
        patch: LlmConfigurationPatch,
    ) -> Result<LlmConfiguration> {
        let mut state = self.state.write().await;
        let sets_default = patch.sets_default();
        let config = state
            .llm_configs
            .iter_mut()
            .find(|c| c.id == config_id && c.user_id == user_id)
            .ok_or_else(|| PersistError::LlmConfigNotFound(config_id.to_string()))?;
        patch.apply(config, Utc::now());
        let updated = config.clone();

        if sets_default {
            state.clear_default_except(user_id, config_id);
        }
        Ok(updated)
    }

    async fn delete_llm_config(&self, config_id: &str, user_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let before = state.llm_configs.len();
        state
            .llm_configs
            .retain(|c| !(c.id == config_id && c.user_id == user_id));
        if state.llm_configs.len() == before {
            return Err(PersistError::LlmConfigNotFound(config_id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceClient for MemoryPersistenceClient {
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageRole, ServerConfig};
    use serde_json::json;
    use std::sync::Arc;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.to_string(),
            email: format!("{}@example.com", name),
            full_name: None,
            hashed_password: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_username_or_email_is_rejected() {
        let store = MemoryPersistenceClient::new();
        store.create_user(new_user("alice")).await.unwrap();

        let mut same_email = new_user("alice2");
        same_email.email = "alice@example.com".to_string();
        assert!(matches!(
            store.create_user(same_email).await,
            Err(PersistError::Duplicate(_))
        ));
        assert!(matches!(
            store.create_user(new_user("alice")).await,
            Err(PersistError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn login_lookup_accepts_username_or_email() {
        let store = MemoryPersistenceClient::new();
        let user = store.create_user(new_user("bob")).await.unwrap();

        let by_name = store.find_user_by_login("bob").await.unwrap().unwrap();
        let by_email = store.find_user_by_login("bob@example.com").await.unwrap().unwrap();
        assert_eq!(by_name.id, user.id);
        assert_eq!(by_email.id, user.id);
        assert!(store.find_user_by_login("carol").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn session_is_consumed_once() {
        let store = MemoryPersistenceClient::new();
        let now = Utc::now();
        store
            .insert_session(Session {
                id: "s1".into(),
                user_id: "u1".into(),
                token_hash: "h1".into(),
                expires_at: now + Duration::days(7),
                created_at: now,
                user_agent: None,
                ip_address: None,
            })
            .await
            .unwrap();

        assert!(store.consume_session("h1").await.unwrap().is_some());
        assert!(store.consume_session("h1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_removes_only_expired_sessions() {
        let store = MemoryPersistenceClient::new();
        let now = Utc::now();
        for (hash, offset) in [("old", -1), ("fresh", 1)] {
            store
                .insert_session(Session {
                    id: hash.into(),
                    user_id: "u1".into(),
                    token_hash: hash.into(),
                    expires_at: now + Duration::hours(offset),
                    created_at: now,
                    user_agent: None,
                    ip_address: None,
                })
                .await
                .unwrap();
        }

        assert_eq!(store.purge_expired_sessions(now).await.unwrap(), 1);
        assert!(!store.delete_session("fresh", "u2").await.unwrap());
        assert!(store.delete_session("fresh", "u1").await.unwrap());
        assert!(!store.delete_session("old", "u1").await.unwrap());
    }

    #[tokio::test]
    async fn foreign_thread_is_not_found() {
        let store = MemoryPersistenceClient::new();
        let thread = store.create_thread("u1", None).await.unwrap();

        let err = store.get_thread(&thread.id, "u2").await.unwrap_err();
        assert!(err.is_not_found());
        let err = store
            .append_message(&thread.id, "u2", NewMessage::user("hi"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(store.list_messages(&thread.id, "u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn appended_messages_get_increasing_seq_and_time() {
        let store = MemoryPersistenceClient::new();
        let thread = store.create_thread("u1", Some("Chat".into())).await.unwrap();

        store.append_message(&thread.id, "u1", NewMessage::user("one")).await.unwrap();
        let batch = store
            .append_messages(
                &thread.id,
                "u1",
                vec![
                    NewMessage::assistant_tool_calls("", serde_json::json!([])),
                    NewMessage::tool_result("call_1", "result"),
                    NewMessage::assistant("done"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(batch.iter().map(|m| m.seq).collect::<Vec<_>>(), vec![2, 3, 4]);

        let history = store.list_messages(&thread.id, "u1").await.unwrap();
        assert!(history.windows(2).all(|w| w[0].created_at < w[1].created_at));
        assert_eq!(history[2].role, MessageRole::Tool);

        let recent = store.recent_messages(&thread.id, "u1", 2).await.unwrap();
        assert_eq!(recent.iter().map(|m| m.seq).collect::<Vec<_>>(), vec![3, 4]);

        let updated = store.get_thread(&thread.id, "u1").await.unwrap();
        assert_eq!(updated.message_count, 4);
        assert_eq!(updated.updated_at, history[3].created_at);
    }

    #[tokio::test]
    async fn concurrent_appends_keep_seq_dense() {
        let store = Arc::new(MemoryPersistenceClient::new());
        let thread = store.create_thread("u1", None).await.unwrap();

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let store = store.clone();
                let id = thread.id.clone();
                tokio::spawn(async move {
                    store.append_message(&id, "u1", NewMessage::user(format!("m{}", i))).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let seqs: Vec<u64> = store
            .list_messages(&thread.id, "u1")
            .await
            .unwrap()
            .iter()
            .map(|m| m.seq)
            .collect();
        assert_eq!(seqs, (1..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn list_hides_archived_and_orders_by_activity() {
        let store = MemoryPersistenceClient::new();
        let first = store.create_thread("u1", Some("first".into())).await.unwrap();
        let second = store.create_thread("u1", Some("second".into())).await.unwrap();
        let archived = store.create_thread("u1", Some("old".into())).await.unwrap();
        store
            .update_thread(&archived.id, "u1", ThreadPatch { title: None, is_archived: Some(true) })
            .await
            .unwrap();
        store.append_message(&first.id, "u1", NewMessage::user("bump")).await.unwrap();

        let listed = store.list_threads("u1").await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|s| s.thread.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);
        assert_eq!(listed[0].last_message_preview.as_deref(), Some("bump"));
    }

    #[tokio::test]
    async fn delete_thread_cascades_to_messages() {
        let store = MemoryPersistenceClient::new();
        let thread = store.create_thread("u1", None).await.unwrap();
        store.append_message(&thread.id, "u1", NewMessage::user("hi")).await.unwrap();

        assert!(store.delete_thread(&thread.id, "u2").await.unwrap_err().is_not_found());
        store.delete_thread(&thread.id, "u1").await.unwrap();
        assert!(store.list_messages(&thread.id, "u1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn tool_servers_keep_insertion_order_and_owner() {
        let store = MemoryPersistenceClient::new();
        let config = ServerConfig::Remote { command: "echo".into(), args: vec![], env: Default::default() };
        let a = store
            .insert_tool_server("u1", NewToolServer { name: "a".into(), description: None, config: config.clone() })
            .await
            .unwrap();
        let b = store
            .insert_tool_server("u1", NewToolServer { name: "b".into(), description: None, config })
            .await
            .unwrap();

        let names: Vec<String> = store
            .list_tool_servers("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(store.list_tool_servers("u2").await.unwrap().is_empty());
        assert!(store.delete_tool_server(&a.id, "u2").await.unwrap_err().is_not_found());

        store.set_tool_server_active(&b.id, true).await.unwrap();
        assert_eq!(store.clear_active_flags().await.unwrap(), 1);
        assert!(!store.get_tool_server(&b.id, "u1").await.unwrap().is_active);
    }

    fn llm_config(name: &str, is_default: bool) -> NewLlmConfiguration {
        NewLlmConfiguration {
            name: name.to_string(),
            provider: "openai".to_string(),
            model_name: "gpt-4o".to_string(),
            configuration: json!({"temperature": 0.2}),
            is_default,
        }
    }

    #[tokio::test]
    async fn only_one_llm_config_is_default_per_user() {
        let store = MemoryPersistenceClient::new();
        let first = store.create_llm_config("u1", llm_config("first", true)).await.unwrap();
        let other_user = store.create_llm_config("u2", llm_config("theirs", true)).await.unwrap();
        let second = store.create_llm_config("u1", llm_config("second", true)).await.unwrap();

        let listed = store.list_llm_configs("u1").await.unwrap();
        let defaults: Vec<&str> = listed.iter().filter(|c| c.is_default).map(|c| c.id.as_str()).collect();
        assert_eq!(defaults, vec![second.id.as_str()]);
        assert_eq!(listed[0].id, second.id);

        store
            .update_llm_config(
                &first.id,
                "u1",
                LlmConfigurationPatch { is_default: Some(true), ..Default::default() },
            )
            .await
            .unwrap();
        let listed = store.list_llm_configs("u1").await.unwrap();
        assert_eq!(listed[0].id, first.id);
        assert!(!listed[1].is_default);

        assert!(store.list_llm_configs("u2").await.unwrap()[0].is_default);
        assert_eq!(store.list_llm_configs("u2").await.unwrap()[0].id, other_user.id);
    }

    #[tokio::test]
    async fn llm_configs_are_owner_scoped() {
        let store = MemoryPersistenceClient::new();
        let config = store.create_llm_config("u1", llm_config("work", false)).await.unwrap();
        assert!(config.is_active);

        let err = store
            .update_llm_config(&config.id, "u2", LlmConfigurationPatch { name: Some("mine".into()), ..Default::default() })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(store.delete_llm_config(&config.id, "u2").await.unwrap_err().is_not_found());
        assert!(store.list_llm_configs("u2").await.unwrap().is_empty());

        store.delete_llm_config(&config.id, "u1").await.unwrap();
        assert!(store.list_llm_configs("u1").await.unwrap().is_empty());
    }
}
