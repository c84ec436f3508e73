use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::{ClientSession, Collection, Database};

use crate::dbs::mongo::models::{to_bson_date, MongoThread};
use crate::error::{PersistError, Result};
use crate::models::{Thread, ThreadPatch};

#[derive(Clone)]
pub struct MongoThreadRepository {
    collection: Collection<MongoThread>,
}

impl MongoThreadRepository {
    pub fn new(db: &Database) -> Self {
        Self { collection: db.collection("threads") }
    }

    pub async fn insert(&self, thread: Thread) -> Result<Thread> {
        self.collection.insert_one(MongoThread::from(thread.clone())).await?;
        Ok(thread)
    }

    pub async fn get_owned(&self, thread_id: &str, user_id: &str) -> Result<Thread> {
        self.collection
            .find_one(doc! { "_id": thread_id, "user_id": user_id })
            .await?
            .map(Into::into)
            .ok_or_else(|| PersistError::ThreadNotFound(thread_id.to_string()))
    }

    pub async fn get_owned_in(
        &self,
        thread_id: &str,
        user_id: &str,
        session: &mut ClientSession,
    ) -> Result<Thread> {
        self.collection
            .find_one(doc! { "_id": thread_id, "user_id": user_id })
            .session(session)
            .await?
            .map(Into::into)
            .ok_or_else(|| PersistError::ThreadNotFound(thread_id.to_string()))
    }

    pub async fn update(&self, thread_id: &str, user_id: &str, patch: ThreadPatch) -> Result<Thread> {
        let mut set = doc! { "updated_at": to_bson_date(chrono::Utc::now()) };
        if let Some(title) = patch.title {
            set.insert("title", title);
        }
        if let Some(archived) = patch.is_archived {
            set.insert("is_archived", archived);
        }

        let result = self
            .collection
            .update_one(doc! { "_id": thread_id, "user_id": user_id }, doc! { "$set": set })
            .await?;
        if result.matched_count == 0 {
            return Err(PersistError::ThreadNotFound(thread_id.to_string()));
        }
        self.get_owned(thread_id, user_id).await
    }

    /// Advances the message counter only if nobody else did since `expected_count`
    /// was read. Returns false on a lost race.
    pub async fn advance(
        &self,
        thread: &Thread,
        expected_count: u64,
        session: &mut ClientSession,
    ) -> Result<bool> {
        let result = self
            .collection
            .update_one(
                doc! { "_id": thread.id.as_str(), "message_count": expected_count as i64 },
                doc! { "$set": {
                    "message_count": thread.message_count as i64,
                    "updated_at": to_bson_date(thread.updated_at),
                } },
            )
            .session(session)
            .await?;
        Ok(result.matched_count == 1)
    }

    pub async fn list_active(&self, user_id: &str) -> Result<Vec<Thread>> {
        let threads: Vec<MongoThread> = self
            .collection
            .find(doc! { "user_id": user_id, "is_archived": false })
            .sort(doc! { "updated_at": -1 })
            .await?
            .try_collect()
            .await?;
        Ok(threads.into_iter().map(Into::into).collect())
    }

    pub async fn delete_owned(
        &self,
        thread_id: &str,
        user_id: &str,
        session: &mut ClientSession,
    ) -> Result<()> {
        let result = self
            .collection
            .delete_one(doc! { "_id": thread_id, "user_id": user_id })
            .session(session)
            .await?;
        if result.deleted_count == 0 {
            return Err(PersistError::ThreadNotFound(thread_id.to_string()));
        }
        Ok(())
    }
}
