use agentify_persist::{LlmConfiguration, LlmConfigurationPatch, NewLlmConfiguration};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLlmConfigurationRequest {
    pub name: String,
    /// e.g. openai, azure, google
    pub provider: String,
    pub model_name: String,
    /// Provider-specific settings. Defaults to `{}`.
    #[schema(value_type = Option<Object>)]
    pub configuration: Option<Value>,
    /// Clears the flag on the caller's other configurations.
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateLlmConfigurationRequest {
    pub name: Option<String>,
    pub provider: Option<String>,
    pub model_name: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub configuration: Option<Value>,
    pub is_default: Option<bool>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LlmConfigurationResponse {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub model_name: String,
    #[schema(value_type = Object)]
    pub configuration: Value,
    pub is_default: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<LlmConfiguration> for LlmConfigurationResponse {
    fn from(config: LlmConfiguration) -> Self {
        Self {
            id: config.id,
            name: config.name,
            provider: config.provider,
            model_name: config.model_name,
            configuration: config.configuration,
            is_default: config.is_default,
            is_active: config.is_active,
            created_at: config.created_at,
            updated_at: config.updated_at,
        }
    }
}

fn required(field: &str, value: String) -> ApiResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn settings(configuration: Value) -> ApiResult<Value> {
    match configuration {
        Value::Object(_) => Ok(configuration),
        _ => Err(ApiError::BadRequest("configuration must be a JSON object".into())),
    }
}

/// List the caller's LLM configurations
///
/// The default configuration comes first, the rest newest first.
#[utoipa::path(
    get,
    path = "/api/llm/configurations",
    responses(
        (status = 200, description = "Saved configurations", body = Vec<LlmConfigurationResponse>)
    ),
    security(("bearer_auth" = [])),
    tag = "llm"
)]
pub async fn list_configurations(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<Vec<LlmConfigurationResponse>>> {
    let configs = state.stores.llm_configs.list_llm_configs(user.id()).await?;
    Ok(Json(configs.into_iter().map(Into::into).collect()))
}

/// Save an LLM configuration
#[utoipa::path(
    post,
    path = "/api/llm/configurations",
    request_body = CreateLlmConfigurationRequest,
    responses(
        (status = 201, description = "Configuration saved", body = LlmConfigurationResponse),
        (status = 400, description = "Invalid input")
    ),
    security(("bearer_auth" = [])),
    tag = "llm"
)]
pub async fn create_configuration(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateLlmConfigurationRequest>,
) -> ApiResult<(StatusCode, Json<LlmConfigurationResponse>)> {
    let config = NewLlmConfiguration {
        name: required("name", req.name)?,
        provider: required("provider", req.provider)?,
        model_name: required("model_name", req.model_name)?,
        configuration: settings(req.configuration.unwrap_or_else(|| Value::Object(Default::default())))?,
        is_default: req.is_default,
    };

    let config = state.stores.llm_configs.create_llm_config(user.id(), config).await?;
    tracing::info!(
        user_id = %user.id(),
        config_id = %config.id,
        provider = %config.provider,
        is_default = config.is_default,
        "LLM configuration created"
    );
    Ok((StatusCode::CREATED, Json(config.into())))
}

/// Update an LLM configuration
#[utoipa::path(
    patch,
    path = "/api/llm/configurations/{config_id}",
    params(("config_id" = String, Path, description = "Configuration id")),
    request_body = UpdateLlmConfigurationRequest,
    responses(
        (status = 200, description = "Updated configuration", body = LlmConfigurationResponse),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Configuration not found")
    ),
    security(("bearer_auth" = [])),
    tag = "llm"
)]
pub async fn update_configuration(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(config_id): Path<String>,
    Json(req): Json<UpdateLlmConfigurationRequest>,
) -> ApiResult<Json<LlmConfigurationResponse>> {
    let patch = LlmConfigurationPatch {
        name: req.name.map(|v| required("name", v)).transpose()?,
        provider: req.provider.map(|v| required("provider", v)).transpose()?,
        model_name: req.model_name.map(|v| required("model_name", v)).transpose()?,
        configuration: req.configuration.map(settings).transpose()?,
        is_default: req.is_default,
        is_active: req.is_active,
    };

    let config = state
        .stores
        .llm_configs
        .update_llm_config(&config_id, user.id(), patch)
        .await?;
    Ok(Json(config.into()))
}

/// Delete an LLM configuration
#[utoipa::path(
    delete,
    path = "/api/llm/configurations/{config_id}",
    params(("config_id" = String, Path, description = "Configuration id")),
    responses(
        (status = 204, description = "Configuration deleted"),
        (status = 404, description = "Configuration not found")
    ),
    security(("bearer_auth" = [])),
    tag = "llm"
)]
pub async fn delete_configuration(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(config_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.stores.llm_configs.delete_llm_config(&config_id, user.id()).await?;
    tracing::info!(user_id = %user.id(), config_id = %config_id, "LLM configuration deleted");
    Ok(StatusCode::NO_CONTENT)
}
