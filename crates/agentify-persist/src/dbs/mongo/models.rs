use mongodb::bson::{self, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{
    LlmConfiguration, Message, MessageRole, ServerConfig, Session, Thread, ToolServer, User,
};

// Documents use string UUID `_id`s so ids look the same on every backend.
// Timestamps are stored as BSON dates, which carry millisecond precision.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub hashed_password: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
    pub last_login: Option<BsonDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSession {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: BsonDateTime,
    pub created_at: BsonDateTime,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoThread {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
    pub is_archived: bool,
    pub message_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMessage {
    #[serde(rename = "_id")]
    pub id: String,
    pub thread_id: String,
    pub seq: i64,
    pub role: MessageRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoToolServer {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub config: ServerConfig,
    pub is_active: bool,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoLlmConfiguration {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub provider: String,
    pub model_name: String,
    #[serde(default)]
    pub configuration: Value,
    pub is_default: bool,
    pub is_active: bool,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

pub fn to_bson_date(dt: chrono::DateTime<chrono::Utc>) -> BsonDateTime {
    BsonDateTime::from_chrono(dt)
}

pub fn config_to_bson(config: &ServerConfig) -> crate::Result<bson::Document> {
    Ok(bson::to_document(config)?)
}

impl From<User> for MongoUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            full_name: u.full_name,
            hashed_password: u.hashed_password,
            is_active: u.is_active,
            is_superuser: u.is_superuser,
            created_at: to_bson_date(u.created_at),
            updated_at: to_bson_date(u.updated_at),
            last_login: u.last_login.map(to_bson_date),
        }
    }
}

impl From<MongoUser> for User {
    fn from(u: MongoUser) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            full_name: u.full_name,
            hashed_password: u.hashed_password,
            is_active: u.is_active,
            is_superuser: u.is_superuser,
            created_at: u.created_at.to_chrono(),
            updated_at: u.updated_at.to_chrono(),
            last_login: u.last_login.map(|d| d.to_chrono()),
        }
    }
}

impl From<Session> for MongoSession {
    fn from(s: Session) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            token_hash: s.token_hash,
            expires_at: to_bson_date(s.expires_at),
            created_at: to_bson_date(s.created_at),
            user_agent: s.user_agent,
            ip_address: s.ip_address,
        }
    }
}

impl From<MongoSession> for Session {
    fn from(s: MongoSession) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            token_hash: s.token_hash,
            expires_at: s.expires_at.to_chrono(),
            created_at: s.created_at.to_chrono(),
            user_agent: s.user_agent,
            ip_address: s.ip_address,
        }
    }
}

impl From<Thread> for MongoThread {
    fn from(t: Thread) -> Self {
        Self {
            id: t.id,
            user_id: t.user_id,
            title: t.title,
            created_at: to_bson_date(t.created_at),
            updated_at: to_bson_date(t.updated_at),
            is_archived: t.is_archived,
            message_count: t.message_count as i64,
        }
    }
}

impl From<MongoThread> for Thread {
    fn from(t: MongoThread) -> Self {
        Self {
            id: t.id,
            user_id: t.user_id,
            title: t.title,
            created_at: t.created_at.to_chrono(),
            updated_at: t.updated_at.to_chrono(),
            is_archived: t.is_archived,
            message_count: t.message_count.max(0) as u64,
        }
    }
}

impl From<Message> for MongoMessage {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            thread_id: m.thread_id,
            seq: m.seq as i64,
            role: m.role,
            content: m.content,
            tool_calls: m.tool_calls,
            tool_call_id: m.tool_call_id,
            metadata: m.metadata,
            created_at: to_bson_date(m.created_at),
        }
    }
}

impl From<MongoMessage> for Message {
    fn from(m: MongoMessage) -> Self {
        Self {
            id: m.id,
            thread_id: m.thread_id,
            seq: m.seq.max(0) as u64,
            role: m.role,
            content: m.content,
            tool_calls: m.tool_calls,
            tool_call_id: m.tool_call_id,
            metadata: m.metadata,
            created_at: m.created_at.to_chrono(),
        }
    }
}

impl From<ToolServer> for MongoToolServer {
    fn from(s: ToolServer) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            name: s.name,
            description: s.description,
            config: s.config,
            is_active: s.is_active,
            created_at: to_bson_date(s.created_at),
            updated_at: to_bson_date(s.updated_at),
        }
    }
}

impl From<MongoToolServer> for ToolServer {
    fn from(s: MongoToolServer) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            name: s.name,
            description: s.description,
            config: s.config,
            is_active: s.is_active,
            created_at: s.created_at.to_chrono(),
            updated_at: s.updated_at.to_chrono(),
        }
    }
}

impl From<LlmConfiguration> for MongoLlmConfiguration {
    fn from(c: LlmConfiguration) -> Self {
        Self {
            id: c.id,
            user_id: c.user_id,
            name: c.name,
            provider: c.provider,
            model_name: c.model_name,
            configuration: c.configuration,
            is_default: c.is_default,
            is_active: c.is_active,
            created_at: to_bson_date(c.created_at),
            updated_at: to_bson_date(c.updated_at),
        }
    }
}

impl From<MongoLlmConfiguration> for LlmConfiguration {
    fn from(c: MongoLlmConfiguration) -> Self {
        Self {
            id: c.id,
            user_id: c.user_id,
            name: c.name,
            provider: c.provider,
            model_name: c.model_name,
            configuration: c.configuration,
            is_default: c.is_default,
            is_active: c.is_active,
            created_at: c.created_at.to_chrono(),
            updated_at: c.updated_at.to_chrono(),
        }
    }
}
