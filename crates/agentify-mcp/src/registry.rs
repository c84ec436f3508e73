use agentify_persist::{
    NewToolServer, ServerAuth, ServerConfig, ToolServer, ToolServerPatch, ToolServerStore,
};
use std::sync::Arc;

use crate::error::{McpError, Result};

/// Per-user CRUD over tool-server descriptors.
///
/// Every lookup is scoped by owner: a descriptor belonging to someone else
/// behaves exactly like a missing one.
#[derive(Clone)]
pub struct ToolServerRegistry {
    store: Arc<dyn ToolServerStore>,
}

impl ToolServerRegistry {
    pub fn new(store: Arc<dyn ToolServerStore>) -> Self {
        Self { store }
    }

    pub async fn add(&self, user_id: &str, server: NewToolServer) -> Result<ToolServer> {
        validate_name(&server.name)?;
        validate_config(&server.config)?;

        let server = self.store.insert_tool_server(user_id, server).await?;
        tracing::info!(user_id, server_id = %server.id, server_type = %server.server_type(), "Tool server registered");
        Ok(server)
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<ToolServer>> {
        Ok(self.store.list_tool_servers(user_id).await?)
    }

    pub async fn get(&self, server_id: &str, user_id: &str) -> Result<ToolServer> {
        Ok(self.store.get_tool_server(server_id, user_id).await?)
    }

    pub async fn update(&self, server_id: &str, user_id: &str, patch: ToolServerPatch) -> Result<ToolServer> {
        if let Some(name) = &patch.name {
            validate_name(name)?;
        }
        if let Some(config) = &patch.config {
            validate_config(config)?;
        }
        Ok(self.store.update_tool_server(server_id, user_id, patch).await?)
    }

    pub async fn remove(&self, server_id: &str, user_id: &str) -> Result<()> {
        self.store.delete_tool_server(server_id, user_id).await?;
        tracing::info!(user_id, server_id, "Tool server removed");
        Ok(())
    }

    pub(crate) async fn set_active(&self, server_id: &str, active: bool) -> Result<()> {
        Ok(self.store.set_tool_server_active(server_id, active).await?)
    }

    /// Connections never survive a restart, so neither should the flags.
    pub async fn clear_active_flags(&self) -> Result<u64> {
        Ok(self.store.clear_active_flags().await?)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(McpError::InvalidConfiguration("name must not be empty".into()));
    }
    Ok(())
}

pub fn validate_config(config: &ServerConfig) -> Result<()> {
    match config {
        ServerConfig::Direct { url, auth } => {
            if url.trim().is_empty() {
                return Err(McpError::InvalidConfiguration("direct servers require a url".into()));
            }
            let parsed = url::Url::parse(url)
                .map_err(|e| McpError::InvalidConfiguration(format!("invalid url '{}': {}", url, e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(McpError::InvalidConfiguration(format!(
                    "unsupported url scheme '{}'",
                    parsed.scheme()
                )));
            }
            validate_auth(auth)
        }
        ServerConfig::Remote { command, .. } => {
            if command.trim().is_empty() {
                return Err(McpError::InvalidConfiguration("remote servers require a command".into()));
            }
            Ok(())
        }
    }
}

fn validate_auth(auth: &ServerAuth) -> Result<()> {
    match auth {
        ServerAuth::None => Ok(()),
        ServerAuth::Bearer { token } if token.is_empty() => {
            Err(McpError::InvalidConfiguration("bearer auth requires a token".into()))
        }
        ServerAuth::ApiKey { header, value } if header.trim().is_empty() || value.is_empty() => {
            Err(McpError::InvalidConfiguration("api key auth requires a header and a value".into()))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentify_persist::MemoryPersistenceClient;

    fn registry() -> ToolServerRegistry {
        ToolServerRegistry::new(Arc::new(MemoryPersistenceClient::new()))
    }

    fn direct(url: &str) -> NewToolServer {
        NewToolServer {
            name: "search".into(),
            description: None,
            config: ServerConfig::Direct { url: url.into(), auth: ServerAuth::None },
        }
    }

    #[tokio::test]
    async fn direct_without_url_is_invalid() {
        let err = registry().add("u1", direct("")).await.unwrap_err();
        assert!(matches!(err, McpError::InvalidConfiguration(_)));
        let err = registry().add("u1", direct("ftp://example.com")).await.unwrap_err();
        assert!(matches!(err, McpError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn remote_without_command_is_invalid() {
        let server = NewToolServer {
            name: "fs".into(),
            description: None,
            config: ServerConfig::Remote { command: " ".into(), args: vec![], env: Default::default() },
        };
        let err = registry().add("u1", server).await.unwrap_err();
        assert!(matches!(err, McpError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn other_users_descriptor_is_not_found() {
        let registry = registry();
        let server = registry.add("alice", direct("https://tools.example.com/mcp")).await.unwrap();

        assert!(registry.list("bob").await.unwrap().is_empty());
        assert!(matches!(registry.remove(&server.id, "bob").await, Err(McpError::NotFound(_))));
        assert!(matches!(
            registry.update(&server.id, "bob", ToolServerPatch::default()).await,
            Err(McpError::NotFound(_))
        ));
        assert_eq!(registry.list("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_validates_new_config() {
        let registry = registry();
        let server = registry.add("alice", direct("https://tools.example.com/mcp")).await.unwrap();
        let patch = ToolServerPatch {
            config: Some(ServerConfig::Direct {
                url: "https://tools.example.com/mcp".into(),
                auth: ServerAuth::Bearer { token: String::new() },
            }),
            ..Default::default()
        };
        let err = registry.update(&server.id, "alice", patch).await.unwrap_err();
        assert!(matches!(err, McpError::InvalidConfiguration(_)));

        let renamed = registry
            .update(&server.id, "alice", ToolServerPatch { name: Some("web".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(renamed.name, "web");
    }
}
