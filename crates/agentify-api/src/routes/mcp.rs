use agentify_mcp::{McpError, ServerConnectionInfo, StatusReport};
use agentify_persist::{NewToolServer, ServerConfig, ToolServer, ToolServerPatch};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateToolServerRequest {
    pub name: String,
    pub description: Option<String>,
    /// `direct` (HTTP endpoint) or `remote` (spawned command).
    pub server_type: String,
    /// `{url, auth}` for direct servers, `{command, args, env}` for remote ones.
    #[schema(value_type = Object)]
    pub configuration: Value,
}

/// `server_type` and `configuration` are replaced together.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateToolServerRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub server_type: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub configuration: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ToolServerResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub server_type: String,
    #[schema(value_type = Object)]
    pub configuration: Value,
    /// Outcome of the last connect or disconnect.
    pub is_active: bool,
    /// Live state in this process.
    pub connection_state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectionResponse {
    pub server_id: String,
    pub state: String,
    pub last_error: Option<String>,
    pub tools: Vec<String>,
}

impl From<ServerConnectionInfo> for ConnectionResponse {
    fn from(info: ServerConnectionInfo) -> Self {
        Self {
            server_id: info.server_id,
            state: info.state.to_string(),
            last_error: info.last_error,
            tools: info.tools,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct McpStatusResponse {
    /// connected, disconnected or error
    pub status: String,
    pub connected_servers: Vec<String>,
    pub tools_count: usize,
    pub tools: Vec<String>,
    pub last_error: Option<String>,
}

impl From<StatusReport> for McpStatusResponse {
    fn from(report: StatusReport) -> Self {
        let status = match report.status {
            agentify_mcp::ConnectorStatus::Connected => "connected",
            agentify_mcp::ConnectorStatus::Disconnected => "disconnected",
            agentify_mcp::ConnectorStatus::Error => "error",
        };
        Self {
            status: status.to_string(),
            connected_servers: report.connected_servers,
            tools_count: report.tools_count,
            tools: report.tools,
            last_error: report.last_error,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ToolResponse {
    pub name: String,
    pub description: Option<String>,
    pub server_id: String,
    pub server_name: String,
    #[schema(value_type = Object)]
    pub input_schema: Value,
}

fn parse_config(server_type: &str, configuration: Value) -> ApiResult<ServerConfig> {
    serde_json::from_value(json!({ "server_type": server_type, "configuration": configuration }))
        .map_err(|e| ApiError::BadRequest(format!("invalid {} server configuration: {}", server_type, e)))
}

async fn to_response(state: &AppState, server: ToolServer) -> ApiResult<ToolServerResponse> {
    let configuration = match serde_json::to_value(&server.config) {
        Ok(Value::Object(mut tagged)) => tagged.remove("configuration").unwrap_or(Value::Null),
        Ok(_) => Value::Null,
        Err(e) => return Err(ApiError::Internal(e.to_string())),
    };
    let connection_state = state.connector.state(&server.id).await.to_string();

    Ok(ToolServerResponse {
        server_type: server.server_type().to_string(),
        id: server.id,
        name: server.name,
        description: server.description,
        configuration,
        is_active: server.is_active,
        connection_state,
        created_at: server.created_at,
        updated_at: server.updated_at,
    })
}

/// List the caller's tool servers
#[utoipa::path(
    get,
    path = "/api/mcp/servers",
    responses(
        (status = 200, description = "Registered servers", body = Vec<ToolServerResponse>)
    ),
    security(("bearer_auth" = [])),
    tag = "mcp"
)]
pub async fn list_servers(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<Vec<ToolServerResponse>>> {
    let servers = state.connector.registry().list(user.id()).await?;
    let mut responses = Vec::with_capacity(servers.len());
    for server in servers {
        responses.push(to_response(&state, server).await?);
    }
    Ok(Json(responses))
}

/// Register a tool server
#[utoipa::path(
    post,
    path = "/api/mcp/servers",
    request_body = CreateToolServerRequest,
    responses(
        (status = 201, description = "Server registered, not yet connected", body = ToolServerResponse),
        (status = 400, description = "Invalid configuration")
    ),
    security(("bearer_auth" = [])),
    tag = "mcp"
)]
pub async fn create_server(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateToolServerRequest>,
) -> ApiResult<(StatusCode, Json<ToolServerResponse>)> {
    let config = parse_config(&req.server_type, req.configuration)?;
    let server = state
        .connector
        .registry()
        .add(
            user.id(),
            NewToolServer {
                name: req.name,
                description: req.description,
                config,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(to_response(&state, server).await?)))
}

/// Update a tool server
///
/// A live connection keeps its old settings until the next connect.
#[utoipa::path(
    patch,
    path = "/api/mcp/servers/{server_id}",
    params(("server_id" = String, Path, description = "Tool server id")),
    request_body = UpdateToolServerRequest,
    responses(
        (status = 200, description = "Updated server", body = ToolServerResponse),
        (status = 400, description = "Invalid configuration"),
        (status = 404, description = "Tool server not found")
    ),
    security(("bearer_auth" = [])),
    tag = "mcp"
)]
pub async fn update_server(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(server_id): Path<String>,
    Json(req): Json<UpdateToolServerRequest>,
) -> ApiResult<Json<ToolServerResponse>> {
    let config = match (req.server_type, req.configuration) {
        (Some(server_type), Some(configuration)) => Some(parse_config(&server_type, configuration)?),
        (None, None) => None,
        _ => {
            return Err(ApiError::BadRequest(
                "server_type and configuration must be updated together".into(),
            ))
        }
    };

    let server = state
        .connector
        .registry()
        .update(
            &server_id,
            user.id(),
            ToolServerPatch {
                name: req.name,
                description: req.description,
                config,
            },
        )
        .await?;

    Ok(Json(to_response(&state, server).await?))
}

/// Delete a tool server, disconnecting it first
#[utoipa::path(
    delete,
    path = "/api/mcp/servers/{server_id}",
    params(("server_id" = String, Path, description = "Tool server id")),
    responses(
        (status = 204, description = "Server deleted"),
        (status = 404, description = "Tool server not found")
    ),
    security(("bearer_auth" = [])),
    tag = "mcp"
)]
pub async fn delete_server(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(server_id): Path<String>,
) -> ApiResult<StatusCode> {
    match state.connector.forget(&server_id, user.id()).await {
        Ok(()) | Err(McpError::NotFound(_)) => {}
        Err(e) => tracing::warn!(server_id = %server_id, error = %e, "Could not disconnect tool server before delete"),
    }

    state.connector.registry().remove(&server_id, user.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Connect to a tool server
#[utoipa::path(
    post,
    path = "/api/mcp/servers/{server_id}/connect",
    params(("server_id" = String, Path, description = "Tool server id")),
    responses(
        (status = 200, description = "Connected", body = ConnectionResponse),
        (status = 404, description = "Tool server not found"),
        (status = 409, description = "A connect or disconnect is already in progress"),
        (status = 502, description = "Server refused the connection"),
        (status = 504, description = "Connection attempt timed out")
    ),
    security(("bearer_auth" = [])),
    tag = "mcp"
)]
pub async fn connect_server(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(server_id): Path<String>,
) -> ApiResult<Json<ConnectionResponse>> {
    let info = state.connector.connect(&server_id, user.id()).await?;
    Ok(Json(info.into()))
}

/// Disconnect from a tool server
#[utoipa::path(
    post,
    path = "/api/mcp/servers/{server_id}/disconnect",
    params(("server_id" = String, Path, description = "Tool server id")),
    responses(
        (status = 200, description = "Disconnected", body = ConnectionResponse),
        (status = 404, description = "Tool server not found")
    ),
    security(("bearer_auth" = [])),
    tag = "mcp"
)]
pub async fn disconnect_server(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(server_id): Path<String>,
) -> ApiResult<Json<ConnectionResponse>> {
    state.connector.disconnect(&server_id, user.id()).await?;
    let connection_state = state.connector.state(&server_id).await;

    Ok(Json(ConnectionResponse {
        server_id,
        state: connection_state.to_string(),
        last_error: None,
        tools: Vec::new(),
    }))
}

/// Aggregate connection status
#[utoipa::path(
    get,
    path = "/api/mcp/status",
    responses(
        (status = 200, description = "Status across the caller's servers", body = McpStatusResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "mcp"
)]
pub async fn status(State(state): State<Arc<AppState>>, user: AuthUser) -> Json<McpStatusResponse> {
    Json(state.connector.status(user.id()).await.into())
}

/// Tools available to the caller's chats
#[utoipa::path(
    get,
    path = "/api/mcp/tools",
    responses(
        (status = 200, description = "Merged tool catalog", body = Vec<ToolResponse>)
    ),
    security(("bearer_auth" = [])),
    tag = "mcp"
)]
pub async fn list_tools(State(state): State<Arc<AppState>>, user: AuthUser) -> Json<Vec<ToolResponse>> {
    let catalog = state.connector.list_tools(user.id()).await;
    Json(
        catalog
            .iter()
            .map(|(name, entry)| ToolResponse {
                name: name.to_string(),
                description: entry.description.clone(),
                server_id: entry.server_id.clone(),
                server_name: entry.server_name.clone(),
                input_schema: entry.input_schema.clone(),
            })
            .collect(),
    )
}
