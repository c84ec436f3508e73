use chrono::{DateTime, Utc};
use mongodb::bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};

use super::is_duplicate_key;
use crate::dbs::mongo::models::{to_bson_date, MongoUser};
use crate::error::{PersistError, Result};
use crate::models::User;

#[derive(Clone)]
pub struct MongoUserRepository {
    collection: Collection<MongoUser>,
}

impl MongoUserRepository {
    pub fn new(db: &Database) -> Self {
        Self { collection: db.collection("users") }
    }

    pub async fn ensure_indexes(&self) -> Result<()> {
        for field in ["username", "email"] {
            let mut keys = Document::new();
            keys.insert(field, 1);
            let index = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build();
            self.collection.create_index(index).await?;
        }
        Ok(())
    }

    pub async fn insert(&self, user: User) -> Result<User> {
        let taken = self
            .collection
            .find_one(doc! { "$or": [ { "username": user.username.as_str() }, { "email": user.email.as_str() } ] })
            .await?;
        if taken.is_some() {
            return Err(PersistError::Duplicate("username or email already registered".to_string()));
        }

        match self.collection.insert_one(MongoUser::from(user.clone())).await {
            Ok(_) => Ok(user),
            // lost a race against a concurrent registration
            Err(e) if is_duplicate_key(&e) => {
                Err(PersistError::Duplicate("username or email already registered".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_by_login(&self, login: &str) -> Result<Option<User>> {
        if let Some(user) = self.collection.find_one(doc! { "username": login }).await? {
            return Ok(Some(user.into()));
        }
        Ok(self
            .collection
            .find_one(doc! { "email": login })
            .await?
            .map(Into::into))
    }

    pub async fn get(&self, user_id: &str) -> Result<User> {
        self.collection
            .find_one(doc! { "_id": user_id })
            .await?
            .map(Into::into)
            .ok_or_else(|| PersistError::UserNotFound(user_id.to_string()))
    }

    pub async fn record_login(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        let at = to_bson_date(at);
        let result = self
            .collection
            .update_one(
                doc! { "_id": user_id },
                doc! { "$set": { "last_login": at, "updated_at": at } },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(PersistError::UserNotFound(user_id.to_string()));
        }
        Ok(())
    }
}
