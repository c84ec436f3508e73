use futures::TryStreamExt;
use mongodb::bson::{self, doc};
use mongodb::{ClientSession, Collection, Database};

use crate::dbs::mongo::models::{to_bson_date, MongoLlmConfiguration};
use crate::error::{PersistError, Result};
use crate::models::{LlmConfiguration, LlmConfigurationPatch};

#[derive(Clone)]
pub struct MongoLlmConfigRepository {
    collection: Collection<MongoLlmConfiguration>,
}

impl MongoLlmConfigRepository {
    pub fn new(db: &Database) -> Self {
        Self { collection: db.collection("llm_configurations") }
    }

    pub async fn ensure_indexes(&self) -> Result<()> {
        let index = mongodb::IndexModel::builder().keys(doc! { "user_id": 1 }).build();
        self.collection.create_index(index).await?;
        Ok(())
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<LlmConfiguration>> {
        let configs: Vec<MongoLlmConfiguration> = self
            .collection
            .find(doc! { "user_id": user_id })
            .sort(doc! { "is_default": -1, "created_at": -1 })
            .await?
            .try_collect()
            .await?;
        Ok(configs.into_iter().map(Into::into).collect())
    }

    pub async fn insert_in(&self, config: &LlmConfiguration, session: &mut ClientSession) -> Result<()> {
        self.collection
            .insert_one(MongoLlmConfiguration::from(config.clone()))
            .session(session)
            .await?;
        Ok(())
    }

    pub async fn update_in(
        &self,
        config_id: &str,
        user_id: &str,
        patch: &LlmConfigurationPatch,
        session: &mut ClientSession,
    ) -> Result<LlmConfiguration> {
        let mut set = doc! { "updated_at": to_bson_date(chrono::Utc::now()) };
        if let Some(name) = &patch.name {
            set.insert("name", name.as_str());
        }
        if let Some(provider) = &patch.provider {
            set.insert("provider", provider.as_str());
        }
        if let Some(model_name) = &patch.model_name {
            set.insert("model_name", model_name.as_str());
        }
        if let Some(configuration) = &patch.configuration {
            set.insert("configuration", bson::to_bson(configuration)?);
        }
        if let Some(is_default) = patch.is_default {
            set.insert("is_default", is_default);
        }
        if let Some(is_active) = patch.is_active {
            set.insert("is_active", is_active);
        }

        let filter = doc! { "_id": config_id, "user_id": user_id };
        let result = self
            .collection
            .update_one(filter.clone(), doc! { "$set": set })
            .session(&mut *session)
            .await?;
        if result.matched_count == 0 {
            return Err(PersistError::LlmConfigNotFound(config_id.to_string()));
        }
        self.collection
            .find_one(filter)
            .session(session)
            .await?
            .map(Into::into)
            .ok_or_else(|| PersistError::LlmConfigNotFound(config_id.to_string()))
    }

    /// Unsets `is_default` on the user's configurations other than `keep`.
    pub async fn clear_default_in(&self, user_id: &str, keep: &str, session: &mut ClientSession) -> Result<u64> {
        let result = self
            .collection
            .update_many(
                doc! { "user_id": user_id, "_id": { "$ne": keep }, "is_default": true },
                doc! { "$set": { "is_default": false } },
            )
            .session(session)
            .await?;
        Ok(result.modified_count)
    }

    pub async fn delete(&self, config_id: &str, user_id: &str) -> Result<()> {
        let result = self
            .collection
            .delete_one(doc! { "_id": config_id, "user_id": user_id })
            .await?;
        if result.deleted_count == 0 {
            return Err(PersistError::LlmConfigNotFound(config_id.to_string()));
        }
        Ok(())
    }
}
