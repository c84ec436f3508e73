use agentify_persist::ToolServer;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::client::MCPClient;

/// Tool information from an MCP server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Flattened result of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub text: String,
    /// The server reported the call as failed.
    pub is_error: bool,
}

/// A live transport to one tool server.
#[async_trait]
pub trait ToolSession: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolInfo>>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput>;

    /// Tear down the transport. Calling it twice is harmless.
    async fn close(&self) -> Result<()>;
}

/// Opens sessions for descriptors. The seam tests replace.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, server: &ToolServer) -> Result<Box<dyn ToolSession>>;
}

/// Opens real MCP sessions with `rmcp`.
#[derive(Debug, Default, Clone)]
pub struct RmcpSessionFactory;

#[async_trait]
impl SessionFactory for RmcpSessionFactory {
    async fn open(&self, server: &ToolServer) -> Result<Box<dyn ToolSession>> {
        let client = MCPClient::connect(&server.name, &server.config).await?;
        Ok(Box::new(client))
    }
}
