use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

pub const DEFAULT_THREAD_TITLE: &str = "New Chat";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    /// Bumped on every appended message.
    pub updated_at: DateTime<Utc>,
    pub is_archived: bool,
    /// Number of messages ever appended; also the last assigned `seq`.
    pub message_count: u64,
}

impl Thread {
    pub fn new(user_id: impl Into<String>, title: Option<String>, now: DateTime<Utc>) -> Self {
        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_THREAD_TITLE.to_string());

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            title,
            created_at: now,
            updated_at: now,
            is_archived: false,
            message_count: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadPatch {
    pub title: Option<String>,
    pub is_archived: Option<bool>,
}

/// Thread listing row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread: Thread,
    pub message_count: u64,
    pub last_message_preview: Option<String>,
}

const PREVIEW_CHARS: usize = 100;

impl ThreadSummary {
    pub fn new(thread: Thread, message_count: u64, last_message: Option<&str>) -> Self {
        Self {
            thread,
            message_count,
            last_message_preview: last_message.map(preview),
        }
    }
}

fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
