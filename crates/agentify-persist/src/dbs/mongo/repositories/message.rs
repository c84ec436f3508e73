use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::{ClientSession, Collection, Database};

use crate::dbs::mongo::models::MongoMessage;
use crate::error::Result;
use crate::models::Message;

#[derive(Clone)]
pub struct MongoMessageRepository {
    collection: Collection<MongoMessage>,
}

impl MongoMessageRepository {
    pub fn new(db: &Database) -> Self {
        Self { collection: db.collection("messages") }
    }

    pub async fn ensure_indexes(&self) -> Result<()> {
        let index = mongodb::IndexModel::builder()
            .keys(doc! { "thread_id": 1, "seq": 1 })
            .options(mongodb::options::IndexOptions::builder().unique(true).build())
            .build();
        self.collection.create_index(index).await?;
        Ok(())
    }

    pub async fn insert_batch(&self, messages: &[Message], session: &mut ClientSession) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let docs: Vec<MongoMessage> = messages.iter().cloned().map(Into::into).collect();
        self.collection.insert_many(docs).session(session).await?;
        Ok(())
    }

    pub async fn list(&self, thread_id: &str) -> Result<Vec<Message>> {
        let messages: Vec<MongoMessage> = self
            .collection
            .find(doc! { "thread_id": thread_id })
            .sort(doc! { "seq": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(messages.into_iter().map(Into::into).collect())
    }

    pub async fn recent(&self, thread_id: &str, limit: usize) -> Result<Vec<Message>> {
        let mut messages: Vec<MongoMessage> = self
            .collection
            .find(doc! { "thread_id": thread_id })
            .sort(doc! { "seq": -1 })
            .limit(limit as i64)
            .await?
            .try_collect()
            .await?;
        messages.reverse();
        Ok(messages.into_iter().map(Into::into).collect())
    }

    pub async fn last(&self, thread_id: &str) -> Result<Option<Message>> {
        Ok(self
            .collection
            .find_one(doc! { "thread_id": thread_id })
            .sort(doc! { "seq": -1 })
            .await?
            .map(Into::into))
    }

    pub async fn delete_for_thread(&self, thread_id: &str, session: &mut ClientSession) -> Result<u64> {
        let result = self
            .collection
            .delete_many(doc! { "thread_id": thread_id })
            .session(session)
            .await?;
        Ok(result.deleted_count)
    }
}
