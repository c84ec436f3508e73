use chrono::{DateTime, Utc};
use mongodb::bson::doc;
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};

use crate::dbs::mongo::models::{to_bson_date, MongoSession};
use crate::error::Result;
use crate::models::Session;

#[derive(Clone)]
pub struct MongoSessionRepository {
    collection: Collection<MongoSession>,
}

impl MongoSessionRepository {
    pub fn new(db: &Database) -> Self {
        Self { collection: db.collection("sessions") }
    }

    pub async fn ensure_indexes(&self) -> Result<()> {
        let index = IndexModel::builder()
            .keys(doc! { "token_hash": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.collection.create_index(index).await?;
        Ok(())
    }

    pub async fn insert(&self, session: Session) -> Result<()> {
        self.collection.insert_one(MongoSession::from(session)).await?;
        Ok(())
    }

    /// `findOneAndDelete` is atomic on the server, so a refresh token can
    /// be redeemed at most once.
    pub async fn take(&self, token_hash: &str) -> Result<Option<Session>> {
        Ok(self
            .collection
            .find_one_and_delete(doc! { "token_hash": token_hash })
            .await?
            .map(Into::into))
    }

    pub async fn delete(&self, token_hash: &str, user_id: &str) -> Result<bool> {
        let result = self
            .collection
            .delete_one(doc! { "token_hash": token_hash, "user_id": user_id })
            .await?;
        Ok(result.deleted_count > 0)
    }

    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = self
            .collection
            .delete_many(doc! { "expires_at": { "$lte": to_bson_date(now) } })
            .await?;
        Ok(result.deleted_count)
    }
}
