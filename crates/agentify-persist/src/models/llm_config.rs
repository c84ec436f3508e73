use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A saved provider and model choice with its provider-specific settings.
///
/// At most one configuration per user has `is_default` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfiguration {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// e.g. "openai", "azure", "google"
    pub provider: String,
    pub model_name: String,
    pub configuration: Value,
    pub is_default: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLlmConfiguration {
    pub name: String,
    pub provider: String,
    pub model_name: String,
    pub configuration: Value,
    pub is_default: bool,
}

impl NewLlmConfiguration {
    pub fn into_configuration(self, user_id: &str, now: DateTime<Utc>) -> LlmConfiguration {
        LlmConfiguration {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: self.name,
            provider: self.provider,
            model_name: self.model_name,
            configuration: self.configuration,
            is_default: self.is_default,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LlmConfigurationPatch {
    pub name: Option<String>,
    pub provider: Option<String>,
    pub model_name: Option<String>,
    pub configuration: Option<Value>,
    pub is_default: Option<bool>,
    pub is_active: Option<bool>,
}

impl LlmConfigurationPatch {
    /// True when applying this patch makes the configuration the default.
    pub fn sets_default(&self) -> bool {
        self.is_default == Some(true)
    }

    pub fn apply(self, config: &mut LlmConfiguration, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            config.name = name;
        }
        if let Some(provider) = self.provider {
            config.provider = provider;
        }
        if let Some(model_name) = self.model_name {
            config.model_name = model_name;
        }
        if let Some(configuration) = self.configuration {
            config.configuration = configuration;
        }
        if let Some(is_default) = self.is_default {
            config.is_default = is_default;
        }
        if let Some(is_active) = self.is_active {
            config.is_active = is_active;
        }
        config.updated_at = now;
    }
}

/// Default first, then newest first.
pub fn sort_for_listing(configs: &mut [LlmConfiguration]) {
    configs.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}
