use agentify_persist::{ServerAuth, ServerConfig};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use rmcp::model::{CallToolRequestParam, RawContent, ResourceContents};
use rmcp::service::RunningService;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::{ConfigureCommandExt, StreamableHttpClientTransport, TokioChildProcess};
use rmcp::{RoleClient, ServiceExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::session::{ToolInfo, ToolOutput, ToolSession};

type ServerSession = RunningService<RoleClient, ()>;

/// MCP client over either a spawned process (stdio) or streamable HTTP.
pub struct MCPClient {
    server_name: String,
    server: Mutex<Option<ServerSession>>,
}

impl MCPClient {
    pub async fn connect(server_name: &str, config: &ServerConfig) -> Result<Self> {
        match config {
            ServerConfig::Direct { url, auth } => Self::new_http(server_name, url, auth).await,
            ServerConfig::Remote { command, args, env } => {
                Self::new_stdio(server_name, command, args, env).await
            }
        }
    }

    /// Spawn a local process and speak MCP over its stdin/stdout.
    pub async fn new_stdio(
        server_name: impl Into<String>,
        command: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let server_name = server_name.into();

        let cmd = Command::new(command).configure(|c| {
            c.args(args);
            c.envs(env);
            c.stdin(Stdio::piped());
            c.stdout(Stdio::piped());
            c.stderr(Stdio::null());
            c.kill_on_drop(true);
        });

        let transport = TokioChildProcess::new(cmd)
            .with_context(|| format!("failed to spawn '{}'", command))?;
        let server = ()
            .serve(transport)
            .await
            .map_err(|e| anyhow!("MCP handshake with '{}' failed: {}", server_name, e))?;

        tracing::info!(server = %server_name, command, "Connected to MCP server over stdio");
        Ok(Self {
            server_name,
            server: Mutex::new(Some(server)),
        })
    }

    /// Connect to a streamable HTTP endpoint, sending `auth` on every request.
    pub async fn new_http(
        server_name: impl Into<String>,
        url: &str,
        auth: &ServerAuth,
    ) -> Result<Self> {
        let server_name = server_name.into();

        let http_client = reqwest::Client::builder()
            .default_headers(auth_headers(auth)?)
            .build()
            .context("Failed to create HTTP client")?;
        let transport = StreamableHttpClientTransport::with_client(
            http_client,
            StreamableHttpClientTransportConfig::with_uri(url.to_string()),
        );
        let server = ()
            .serve(transport)
            .await
            .map_err(|e| anyhow!("MCP handshake with {} failed: {}", url, e))?;

        tracing::info!(server = %server_name, url, "Connected to MCP server over HTTP");
        Ok(Self {
            server_name,
            server: Mutex::new(Some(server)),
        })
    }

    pub fn name(&self) -> &str {
        &self.server_name
    }
}

fn auth_headers(auth: &ServerAuth) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    match auth {
        ServerAuth::None => {}
        ServerAuth::Bearer { token } => {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token)).context("Invalid bearer token")?,
            );
        }
        ServerAuth::ApiKey { header, value } => {
            headers.insert(
                HeaderName::from_bytes(header.as_bytes()).context("Invalid API key header name")?,
                HeaderValue::from_str(value).context("Invalid API key value")?,
            );
        }
    }
    Ok(headers)
}

fn content_to_text(content: &RawContent) -> String {
    match content {
        RawContent::Text(text) => text.text.clone(),
        RawContent::Image(image) => format!("[Image: {}]", image.mime_type),
        RawContent::Resource(resource) => match &resource.resource {
            ResourceContents::TextResourceContents { uri, text, .. } => format!("{}\n{}", uri, text),
            ResourceContents::BlobResourceContents { uri, .. } => uri.clone(),
        },
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[async_trait]
impl ToolSession for MCPClient {
    async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let guard = self.server.lock().await;
        let server = guard.as_ref().ok_or_else(|| anyhow!("session closed"))?;

        let tools = server.list_all_tools().await?;
        Ok(tools
            .into_iter()
            .map(|tool| ToolInfo {
                name: tool.name.to_string(),
                description: tool.description.map(|d| d.to_string()),
                input_schema: Value::Object((*tool.input_schema).clone()),
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput> {
        let arguments = match arguments {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => return Err(anyhow!("tool arguments must be an object, got {}", other)),
        };

        let guard = self.server.lock().await;
        let server = guard.as_ref().ok_or_else(|| anyhow!("session closed"))?;

        let result = server
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments,
            })
            .await?;

        let mut text = result
            .content
            .iter()
            .map(|c| content_to_text(&c.raw))
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            if let Some(structured) = &result.structured_content {
                text = structured.to_string();
            }
        }

        Ok(ToolOutput {
            text,
            is_error: result.is_error.unwrap_or(false),
        })
    }

    async fn close(&self) -> Result<()> {
        if let Some(server) = self.server.lock().await.take() {
            server.cancel().await?;
            tracing::debug!(server = %self.server_name, "MCP session closed");
        }
        Ok(())
    }
}
