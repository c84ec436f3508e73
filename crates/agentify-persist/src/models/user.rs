use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account record. Users are deactivated, never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub hashed_password: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub hashed_password: String,
}

impl NewUser {
    pub fn into_user(self, now: DateTime<Utc>) -> User {
        User {
            id: uuid::Uuid::new_v4().to_string(),
            username: self.username,
            email: self.email,
            full_name: self.full_name,
            hashed_password: self.hashed_password,
            is_active: true,
            is_superuser: false,
            created_at: now,
            updated_at: now,
            last_login: None,
        }
    }
}
