use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::catalog::ToolCatalog;
use crate::error::{McpError, Result};
use crate::registry::ToolServerRegistry;
use crate::session::{SessionFactory, ToolInfo, ToolOutput, ToolSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(s)
    }
}

/// Aggregate status across one user's servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorStatus {
    Connected,
    Disconnected,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: ConnectorStatus,
    pub connected_servers: Vec<String>,
    pub tools_count: usize,
    /// First few tool names, for display.
    pub tools: Vec<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerConnectionInfo {
    pub server_id: String,
    pub state: ConnectionState,
    pub last_error: Option<String>,
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectorTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for ConnectorTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            request: Duration::from_secs(60),
        }
    }
}

const STATUS_TOOL_NAMES: usize = 5;

struct LiveServer {
    id: String,
    name: String,
    session: Arc<dyn ToolSession>,
    tools: Vec<ToolInfo>,
}

struct Connection {
    owner: String,
    server_name: String,
    state: ConnectionState,
    session: Option<Arc<dyn ToolSession>>,
    tools: Vec<ToolInfo>,
    /// Order of the last successful connect; later wins in the catalog.
    connected_seq: u64,
    /// Order of the last connect attempt, successful or not.
    attempt_seq: u64,
    last_error: Option<String>,
    /// Descriptor was deleted mid-transition; whoever finishes the
    /// transition closes the session and drops the entry.
    forgotten: bool,
}

impl Connection {
    fn new(owner: &str, server_name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            server_name: server_name.to_string(),
            state: ConnectionState::Disconnected,
            session: None,
            tools: Vec::new(),
            connected_seq: 0,
            attempt_seq: 0,
            last_error: None,
            forgotten: false,
        }
    }
}

/// Connection state machine over registered tool servers.
///
/// Live sessions exist only in this process. Persisted `is_active` flags
/// mirror the last outcome but are never read back as live state.
pub struct ToolServerConnector {
    registry: ToolServerRegistry,
    factory: Arc<dyn SessionFactory>,
    connections: RwLock<HashMap<String, Connection>>,
    seq: AtomicU64,
    timeouts: ConnectorTimeouts,
}

impl ToolServerConnector {
    pub fn new(registry: ToolServerRegistry, factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            registry,
            factory,
            connections: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
            timeouts: ConnectorTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: ConnectorTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn registry(&self) -> &ToolServerRegistry {
        &self.registry
    }

    /// Clears stale persisted flags left by a previous process.
    pub async fn reset_persisted_flags(&self) -> Result<u64> {
        let cleared = self.registry.clear_active_flags().await?;
        if cleared > 0 {
            tracing::info!(cleared, "Reset tool servers marked active by a previous run");
        }
        Ok(cleared)
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Disconnected -> Connecting -> Connected, or back to Disconnected on
    /// failure. No retry; the caller decides.
    pub async fn connect(&self, server_id: &str, user_id: &str) -> Result<ServerConnectionInfo> {
        let descriptor = self.registry.get(server_id, user_id).await?;

        {
            let mut connections = self.connections.write().await;
            let conn = connections
                .entry(server_id.to_string())
                .or_insert_with(|| Connection::new(user_id, &descriptor.name));
            match conn.state {
                ConnectionState::Disconnected => {}
                ConnectionState::Connected => {
                    return Ok(info(server_id, conn));
                }
                from => {
                    return Err(McpError::InvalidTransition { from, to: ConnectionState::Connecting });
                }
            }
            conn.state = ConnectionState::Connecting;
            conn.server_name = descriptor.name.clone();
            conn.attempt_seq = self.next_seq();
        }

        tracing::info!(user_id, server_id, server_type = %descriptor.server_type(), "Connecting tool server");
        let started = std::time::Instant::now();

        let opened = with_timeout(self.timeouts.connect, async {
            let session: Arc<dyn ToolSession> = Arc::from(self.factory.open(&descriptor).await?);
            match session.list_tools().await {
                Ok(tools) => Ok((session, tools)),
                Err(e) => {
                    let _ = session.close().await;
                    Err(e)
                }
            }
        })
        .await;

        let mut forgotten = false;
        let mut orphaned = None;
        let outcome = {
            let mut connections = self.connections.write().await;
            match connections.get_mut(server_id).filter(|c| !c.forgotten) {
                Some(conn) => match opened {
                    Ok((session, tools)) => {
                        conn.state = ConnectionState::Connected;
                        conn.session = Some(session);
                        conn.tools = tools;
                        conn.connected_seq = self.next_seq();
                        conn.last_error = None;
                        Ok(info(server_id, conn))
                    }
                    Err(err) => {
                        conn.state = ConnectionState::Disconnected;
                        conn.session = None;
                        conn.tools.clear();
                        conn.last_error = Some(err.to_string());
                        Err(err)
                    }
                },
                None => {
                    // deleted while we were connecting
                    connections.remove(server_id);
                    forgotten = true;
                    orphaned = opened.ok().map(|(session, _)| session);
                    Err(McpError::NotFound(server_id.to_string()))
                }
            }
        };

        if forgotten {
            if let Some(session) = orphaned {
                close_session(server_id, session, self.timeouts.request).await;
            }
            tracing::info!(user_id, server_id, "Tool server deleted during connect, session dropped");
            return outcome;
        }

        let active = outcome.is_ok();
        if let Err(e) = self.registry.set_active(server_id, active).await {
            tracing::warn!(server_id, error = %e, "Failed to record tool server state");
        }

        match &outcome {
            Ok(conn) => tracing::info!(
                user_id,
                server_id,
                tools = conn.tools.len(),
                duration_ms = started.elapsed().as_millis() as u64,
                "Tool server connected"
            ),
            Err(e) => tracing::warn!(user_id, server_id, error = %e, "Tool server connection failed"),
        }
        outcome
    }

    /// Connected -> Disconnecting -> Disconnected. Teardown errors are
    /// logged and the server ends up Disconnected regardless.
    pub async fn disconnect(&self, server_id: &str, user_id: &str) -> Result<()> {
        self.registry.get(server_id, user_id).await?;
        self.teardown(server_id, false).await?;

        if let Err(e) = self.registry.set_active(server_id, false).await {
            tracing::warn!(server_id, error = %e, "Failed to record tool server state");
        }
        tracing::info!(user_id, server_id, "Tool server disconnected");
        Ok(())
    }

    /// Drop a live connection for a descriptor that is about to be deleted.
    ///
    /// A connect or disconnect still in flight is marked instead; it closes
    /// its session and drops the entry when it finishes.
    pub async fn forget(&self, server_id: &str, user_id: &str) -> Result<()> {
        self.registry.get(server_id, user_id).await?;
        self.teardown(server_id, true).await
    }

    async fn teardown(&self, server_id: &str, forget: bool) -> Result<()> {
        let session = {
            let mut connections = self.connections.write().await;
            let Some(conn) = connections.get_mut(server_id) else {
                return Ok(());
            };
            let state = conn.state;
            match state {
                ConnectionState::Connected => {}
                ConnectionState::Disconnected => {
                    if forget {
                        connections.remove(server_id);
                    } else {
                        conn.last_error = None;
                    }
                    return Ok(());
                }
                _ if forget => {
                    conn.forgotten = true;
                    return Ok(());
                }
                from => {
                    return Err(McpError::InvalidTransition { from, to: ConnectionState::Disconnecting });
                }
            }
            conn.state = ConnectionState::Disconnecting;
            conn.session.take()
        };

        if let Some(session) = session {
            close_session(server_id, session, self.timeouts.request).await;
        }

        let mut connections = self.connections.write().await;
        let drop_entry = forget || connections.get(server_id).is_some_and(|c| c.forgotten);
        if drop_entry {
            connections.remove(server_id);
        } else if let Some(conn) = connections.get_mut(server_id) {
            conn.state = ConnectionState::Disconnected;
            conn.tools.clear();
            conn.last_error = None;
        }
        Ok(())
    }

    pub async fn state(&self, server_id: &str) -> ConnectionState {
        self.connections
            .read()
            .await
            .get(server_id)
            .map_or(ConnectionState::Disconnected, |c| c.state)
    }

    pub async fn status(&self, user_id: &str) -> StatusReport {
        let (connected, latest_error) = {
            let connections = self.connections.read().await;
            let mine: Vec<&Connection> = connections.values().filter(|c| c.owner == user_id).collect();

            let mut connected: Vec<(u64, String)> = connections
                .iter()
                .filter(|(_, c)| c.owner == user_id && c.state == ConnectionState::Connected)
                .map(|(id, c)| (c.connected_seq, id.clone()))
                .collect();
            connected.sort();

            let latest_error = mine
                .iter()
                .max_by_key(|c| c.attempt_seq)
                .and_then(|c| c.last_error.clone());
            (connected, latest_error)
        };

        let catalog = self.cached_catalog(user_id).await;
        let status = if !connected.is_empty() {
            ConnectorStatus::Connected
        } else if latest_error.is_some() {
            ConnectorStatus::Error
        } else {
            ConnectorStatus::Disconnected
        };

        StatusReport {
            status,
            connected_servers: connected.into_iter().map(|(_, id)| id).collect(),
            tools_count: catalog.len(),
            tools: catalog.names().take(STATUS_TOOL_NAMES).map(str::to_string).collect(),
            last_error: latest_error,
        }
    }

    /// Connected servers in connection order, with their sessions.
    async fn live_servers(&self, user_id: &str) -> Vec<LiveServer> {
        let connections = self.connections.read().await;
        let mut live: Vec<(u64, LiveServer)> = connections
            .iter()
            .filter(|(_, c)| c.owner == user_id && c.state == ConnectionState::Connected)
            .filter_map(|(id, c)| {
                let session = c.session.clone()?;
                Some((
                    c.connected_seq,
                    LiveServer {
                        id: id.clone(),
                        name: c.server_name.clone(),
                        session,
                        tools: c.tools.clone(),
                    },
                ))
            })
            .collect();
        live.sort_by_key(|(seq, _)| *seq);
        live.into_iter().map(|(_, server)| server).collect()
    }

    /// Queries every connected server for its current tools and merges them.
    /// A server that fails to answer contributes its tools from connect time.
    pub async fn list_tools(&self, user_id: &str) -> ToolCatalog {
        let live = self.live_servers(user_id).await;

        let queries = live.iter().map(|server| async move {
            match tokio::time::timeout(self.timeouts.request, server.session.list_tools()).await {
                Ok(Ok(tools)) => tools,
                Ok(Err(e)) => {
                    tracing::warn!(server_id = %server.id, error = %e, "Listing tools failed, using cached list");
                    server.tools.clone()
                }
                Err(_) => {
                    tracing::warn!(server_id = %server.id, "Listing tools timed out, using cached list");
                    server.tools.clone()
                }
            }
        });
        let results = futures::future::join_all(queries).await;

        let mut catalog = ToolCatalog::new();
        let mut connections = self.connections.write().await;
        for (server, tools) in live.iter().zip(results) {
            // keep the routing cache in step with what the LLM is shown
            if let Some(conn) = connections.get_mut(&server.id) {
                if conn.state == ConnectionState::Connected {
                    conn.tools = tools.clone();
                }
            }
            catalog.merge(&server.id, &server.name, tools);
        }
        catalog
    }

    async fn cached_catalog(&self, user_id: &str) -> ToolCatalog {
        let mut catalog = ToolCatalog::new();
        for server in self.live_servers(user_id).await {
            catalog.merge(&server.id, &server.name, server.tools);
        }
        catalog
    }

    /// Routes a call to the server that owns `name` in the user's catalog.
    pub async fn call_tool(&self, user_id: &str, name: &str, arguments: Value) -> Result<ToolOutput> {
        let catalog = self.cached_catalog(user_id).await;
        let entry = catalog
            .get(name)
            .ok_or_else(|| McpError::ToolNotFound(name.to_string()))?;

        let session = {
            let connections = self.connections.read().await;
            connections
                .get(&entry.server_id)
                .filter(|c| c.state == ConnectionState::Connected)
                .and_then(|c| c.session.clone())
                .ok_or_else(|| McpError::ToolNotFound(name.to_string()))?
        };

        let started = std::time::Instant::now();
        let output = tokio::time::timeout(self.timeouts.request, session.call_tool(name, arguments))
            .await
            .map_err(|_| McpError::Timeout(self.timeouts.request))?
            .map_err(|e| McpError::ToolCall(e.to_string()))?;

        tracing::debug!(
            user_id,
            server_id = %entry.server_id,
            tool = name,
            is_error = output.is_error,
            duration_ms = started.elapsed().as_millis() as u64,
            "Tool call finished"
        );
        Ok(output)
    }

    /// Closes every live session. Used on shutdown.
    pub async fn shutdown(&self) {
        let sessions: Vec<(String, Arc<dyn ToolSession>)> = {
            let mut connections = self.connections.write().await;
            connections
                .drain()
                .filter_map(|(id, c)| c.session.map(|s| (id, s)))
                .collect()
        };
        for (server_id, session) in sessions {
            if let Err(e) = session.close().await {
                tracing::warn!(server_id = %server_id, error = %e, "Error while closing tool server");
            }
        }
    }
}

fn info(server_id: &str, conn: &Connection) -> ServerConnectionInfo {
    ServerConnectionInfo {
        server_id: server_id.to_string(),
        state: conn.state,
        last_error: conn.last_error.clone(),
        tools: conn.tools.iter().map(|t| t.name.clone()).collect(),
    }
}

async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(McpError::ConnectionFailed { reason: format!("{:#}", e) }),
        Err(_) => Err(McpError::Timeout(limit)),
    }
}

async fn close_session(server_id: &str, session: Arc<dyn ToolSession>, limit: Duration) {
    match tokio::time::timeout(limit, session.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(server_id, error = %e, "Error while closing tool server"),
        Err(_) => tracing::warn!(server_id, "Timed out closing tool server"),
    }
}
