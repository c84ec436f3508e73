use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::{Collection, Database};

use crate::dbs::mongo::models::{config_to_bson, to_bson_date, MongoToolServer};
use crate::error::{PersistError, Result};
use crate::models::{ToolServer, ToolServerPatch};

#[derive(Clone)]
pub struct MongoToolServerRepository {
    collection: Collection<MongoToolServer>,
}

impl MongoToolServerRepository {
    pub fn new(db: &Database) -> Self {
        Self { collection: db.collection("mcp_servers") }
    }

    pub async fn insert(&self, server: ToolServer) -> Result<ToolServer> {
        self.collection.insert_one(MongoToolServer::from(server.clone())).await?;
        Ok(server)
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<ToolServer>> {
        let servers: Vec<MongoToolServer> = self
            .collection
            .find(doc! { "user_id": user_id })
            .sort(doc! { "created_at": 1, "_id": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(servers.into_iter().map(Into::into).collect())
    }

    pub async fn get_owned(&self, server_id: &str, user_id: &str) -> Result<ToolServer> {
        self.collection
            .find_one(doc! { "_id": server_id, "user_id": user_id })
            .await?
            .map(Into::into)
            .ok_or_else(|| PersistError::ToolServerNotFound(server_id.to_string()))
    }

    pub async fn update(
        &self,
        server_id: &str,
        user_id: &str,
        patch: ToolServerPatch,
    ) -> Result<ToolServer> {
        let mut set = doc! { "updated_at": to_bson_date(chrono::Utc::now()) };
        if let Some(name) = patch.name {
            set.insert("name", name);
        }
        if let Some(description) = patch.description {
            set.insert("description", description);
        }
        if let Some(config) = &patch.config {
            for (key, value) in config_to_bson(config)? {
                set.insert(key, value);
            }
        }

        let result = self
            .collection
            .update_one(doc! { "_id": server_id, "user_id": user_id }, doc! { "$set": set })
            .await?;
        if result.matched_count == 0 {
            return Err(PersistError::ToolServerNotFound(server_id.to_string()));
        }
        self.get_owned(server_id, user_id).await
    }

    pub async fn delete(&self, server_id: &str, user_id: &str) -> Result<()> {
        let result = self
            .collection
            .delete_one(doc! { "_id": server_id, "user_id": user_id })
            .await?;
        if result.deleted_count == 0 {
            return Err(PersistError::ToolServerNotFound(server_id.to_string()));
        }
        Ok(())
    }

    pub async fn set_active(&self, server_id: &str, active: bool) -> Result<()> {
        let result = self
            .collection
            .update_one(
                doc! { "_id": server_id },
                doc! { "$set": { "is_active": active, "updated_at": to_bson_date(chrono::Utc::now()) } },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(PersistError::ToolServerNotFound(server_id.to_string()));
        }
        Ok(())
    }

    pub async fn clear_active(&self) -> Result<u64> {
        let result = self
            .collection
            .update_many(doc! { "is_active": true }, doc! { "$set": { "is_active": false } })
            .await?;
        Ok(result.modified_count)
    }
}
