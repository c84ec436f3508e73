use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted description of how to reach one MCP tool server.
///
/// `is_active` records the outcome of the most recent connect/disconnect.
/// It is not a live status; the connector is the source of truth for that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServer {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub config: ServerConfig,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ToolServer {
    pub fn server_type(&self) -> ServerType {
        self.config.server_type()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerType {
    /// Reached over HTTP at a URL.
    Direct,
    /// Launched locally as a child process speaking stdio.
    Remote,
}

impl std::fmt::Display for ServerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "server_type", content = "configuration", rename_all = "snake_case")]
pub enum ServerConfig {
    Direct {
        url: String,
        #[serde(default)]
        auth: ServerAuth,
    },
    Remote {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
}

impl ServerConfig {
    pub fn server_type(&self) -> ServerType {
        match self {
            Self::Direct { .. } => ServerType::Direct,
            Self::Remote { .. } => ServerType::Remote,
        }
    }
}

/// Credentials attached to every request sent to a direct server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerAuth {
    #[default]
    None,
    Bearer {
        token: String,
    },
    ApiKey {
        header: String,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct NewToolServer {
    pub name: String,
    pub description: Option<String>,
    pub config: ServerConfig,
}

impl NewToolServer {
    pub fn into_tool_server(self, user_id: &str, now: DateTime<Utc>) -> ToolServer {
        ToolServer {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: self.name,
            description: self.description,
            config: self.config,
            is_active: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolServerPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub config: Option<ServerConfig>,
}

impl ToolServerPatch {
    pub fn apply(self, server: &mut ToolServer, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            server.name = name;
        }
        if let Some(description) = self.description {
            server.description = Some(description);
        }
        if let Some(config) = self.config {
            server.config = config;
        }
        server.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_uses_server_type_and_configuration_keys() {
        let config: ServerConfig = serde_json::from_value(json!({
            "server_type": "direct",
            "configuration": {"url": "https://tools.example.com/mcp", "auth": {"type": "bearer", "token": "t"}}
        }))
        .unwrap();

        assert_eq!(config.server_type(), ServerType::Direct);
        match config {
            ServerConfig::Direct { url, auth } => {
                assert_eq!(url, "https://tools.example.com/mcp");
                assert_eq!(auth, ServerAuth::Bearer { token: "t".into() });
            }
            other => panic!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn remote_defaults_args_and_env() {
        let config: ServerConfig = serde_json::from_value(json!({
            "server_type": "remote",
            "configuration": {"command": "npx"}
        }))
        .unwrap();
        assert_eq!(
            config,
            ServerConfig::Remote { command: "npx".into(), args: vec![], env: BTreeMap::new() }
        );
    }
}
