use agentify_mcp::{
    ConnectionState, ConnectorStatus, ConnectorTimeouts, McpError, SessionFactory, ToolInfo,
    ToolOutput, ToolServerConnector, ToolServerRegistry, ToolSession,
};
use agentify_persist::{
    MemoryPersistenceClient, NewToolServer, ServerAuth, ServerConfig, ToolServer, ToolServerStore,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Serves a fixed tool list per server name; names listed in `failing`
/// refuse to connect.
#[derive(Default)]
struct StubFactory {
    tools: HashMap<String, Vec<&'static str>>,
    failing: Vec<String>,
    hanging: Vec<String>,
    /// Take a moment to open, long enough to act mid-connect.
    slow: Vec<String>,
    closed: Arc<AtomicUsize>,
}

struct StubSession {
    server: String,
    tools: Vec<&'static str>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl ToolSession for StubSession {
    async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        Ok(self
            .tools
            .iter()
            .map(|name| ToolInfo {
                name: name.to_string(),
                description: Some(format!("{} from {}", name, self.server)),
                input_schema: json!({"type": "object"}),
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput> {
        Ok(ToolOutput {
            text: format!("{}:{}:{}", self.server, name, arguments),
            is_error: false,
        })
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl SessionFactory for StubFactory {
    async fn open(&self, server: &ToolServer) -> Result<Box<dyn ToolSession>> {
        if self.failing.contains(&server.name) {
            return Err(anyhow!("connection refused"));
        }
        if self.hanging.contains(&server.name) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.slow.contains(&server.name) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Ok(Box::new(StubSession {
            server: server.name.clone(),
            tools: self.tools.get(&server.name).cloned().unwrap_or_default(),
            closed: self.closed.clone(),
        }))
    }
}

struct Fixture {
    connector: ToolServerConnector,
    store: Arc<MemoryPersistenceClient>,
    closed: Arc<AtomicUsize>,
}

fn fixture(factory: StubFactory) -> Fixture {
    let store = Arc::new(MemoryPersistenceClient::new());
    let closed = factory.closed.clone();
    let connector = ToolServerConnector::new(ToolServerRegistry::new(store.clone()), Arc::new(factory))
        .with_timeouts(ConnectorTimeouts {
            connect: Duration::from_millis(200),
            request: Duration::from_secs(1),
        });
    Fixture { connector, store, closed }
}

async fn add(fx: &Fixture, user: &str, name: &str) -> ToolServer {
    fx.connector
        .registry()
        .add(
            user,
            NewToolServer {
                name: name.to_string(),
                description: None,
                config: ServerConfig::Direct {
                    url: format!("https://{}.example.com/mcp", name),
                    auth: ServerAuth::None,
                },
            },
        )
        .await
        .unwrap()
}

fn factory(servers: &[(&str, Vec<&'static str>)]) -> StubFactory {
    StubFactory {
        tools: servers
            .iter()
            .map(|(name, tools)| (name.to_string(), tools.clone()))
            .collect(),
        ..Default::default()
    }
}

#[tokio::test]
async fn connect_marks_descriptor_active_and_disconnect_clears_it() {
    let fx = fixture(factory(&[("web", vec!["search"])]));
    let server = add(&fx, "alice", "web").await;

    let info = fx.connector.connect(&server.id, "alice").await.unwrap();
    assert_eq!(info.state, ConnectionState::Connected);
    assert_eq!(info.tools, vec!["search"]);
    assert!(fx.store.get_tool_server(&server.id, "alice").await.unwrap().is_active);

    fx.connector.disconnect(&server.id, "alice").await.unwrap();
    assert_eq!(fx.connector.state(&server.id).await, ConnectionState::Disconnected);
    assert!(!fx.store.get_tool_server(&server.id, "alice").await.unwrap().is_active);
    assert_eq!(fx.closed.load(Ordering::SeqCst), 1);

    // disconnecting again is a no-op
    fx.connector.disconnect(&server.id, "alice").await.unwrap();
    assert_eq!(fx.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn no_servers_means_disconnected() {
    let fx = fixture(StubFactory::default());
    let status = fx.connector.status("alice").await;
    assert_eq!(status.status, ConnectorStatus::Disconnected);
    assert_eq!(status.tools_count, 0);
}

#[tokio::test]
async fn failed_connect_reports_error_status() {
    let mut stub = factory(&[]);
    stub.failing.push("broken".into());
    let fx = fixture(stub);
    let server = add(&fx, "alice", "broken").await;

    let err = fx.connector.connect(&server.id, "alice").await.unwrap_err();
    assert!(matches!(err, McpError::ConnectionFailed { .. }));
    assert_eq!(fx.connector.state(&server.id).await, ConnectionState::Disconnected);
    assert!(!fx.store.get_tool_server(&server.id, "alice").await.unwrap().is_active);

    let status = fx.connector.status("alice").await;
    assert_eq!(status.status, ConnectorStatus::Error);
    assert!(status.last_error.unwrap().contains("connection refused"));
}

#[tokio::test]
async fn slow_connect_times_out() {
    let mut stub = factory(&[]);
    stub.hanging.push("slow".into());
    let fx = fixture(stub);
    let server = add(&fx, "alice", "slow").await;

    let err = fx.connector.connect(&server.id, "alice").await.unwrap_err();
    assert!(matches!(err, McpError::Timeout(_)));
    assert_eq!(fx.connector.state(&server.id).await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn one_failure_does_not_hide_a_live_server() {
    let mut stub = factory(&[("good", vec!["lookup"])]);
    stub.failing.push("bad".into());
    let fx = fixture(stub);
    let good = add(&fx, "alice", "good").await;
    let bad = add(&fx, "alice", "bad").await;

    fx.connector.connect(&good.id, "alice").await.unwrap();
    assert!(fx.connector.connect(&bad.id, "alice").await.is_err());

    let status = fx.connector.status("alice").await;
    assert_eq!(status.status, ConnectorStatus::Connected);
    assert_eq!(status.connected_servers, vec![good.id.clone()]);

    let catalog = fx.connector.list_tools("alice").await;
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.get("lookup").unwrap().server_id, good.id);
}

#[tokio::test]
async fn colliding_tool_names_bind_to_later_connection() {
    let fx = fixture(factory(&[("first", vec!["search", "fetch"]), ("second", vec!["search"])]));
    let first = add(&fx, "alice", "first").await;
    let second = add(&fx, "alice", "second").await;

    // connect in reverse registration order: connection order decides
    fx.connector.connect(&second.id, "alice").await.unwrap();
    fx.connector.connect(&first.id, "alice").await.unwrap();

    let catalog = fx.connector.list_tools("alice").await;
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.get("search").unwrap().server_id, first.id);

    let output = fx
        .connector
        .call_tool("alice", "search", json!({"q": "rust"}))
        .await
        .unwrap();
    assert!(output.text.starts_with("first:search:"));
}

#[tokio::test]
async fn other_users_cannot_touch_descriptor() {
    let fx = fixture(factory(&[("web", vec!["search"])]));
    let server = add(&fx, "alice", "web").await;

    assert!(matches!(
        fx.connector.connect(&server.id, "bob").await,
        Err(McpError::NotFound(_))
    ));
    assert!(fx.connector.registry().list("bob").await.unwrap().is_empty());
    assert!(matches!(
        fx.connector.registry().remove(&server.id, "bob").await,
        Err(McpError::NotFound(_))
    ));

    fx.connector.connect(&server.id, "alice").await.unwrap();
    assert!(fx.connector.list_tools("bob").await.is_empty());
    assert!(matches!(
        fx.connector.call_tool("bob", "search", json!({})).await,
        Err(McpError::ToolNotFound(_))
    ));
    assert!(matches!(
        fx.connector.disconnect(&server.id, "bob").await,
        Err(McpError::NotFound(_))
    ));
}

#[tokio::test]
async fn startup_reset_clears_stale_flags() {
    let fx = fixture(factory(&[("web", vec!["search"])]));
    let server = add(&fx, "alice", "web").await;
    fx.store.set_tool_server_active(&server.id, true).await.unwrap();

    assert_eq!(fx.connector.reset_persisted_flags().await.unwrap(), 1);
    assert!(!fx.store.get_tool_server(&server.id, "alice").await.unwrap().is_active);
    assert_eq!(fx.connector.state(&server.id).await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn forget_closes_and_drops_connection() {
    let fx = fixture(factory(&[("web", vec!["search"])]));
    let server = add(&fx, "alice", "web").await;
    fx.connector.connect(&server.id, "alice").await.unwrap();

    fx.connector.forget(&server.id, "alice").await.unwrap();
    fx.connector.registry().remove(&server.id, "alice").await.unwrap();
    assert_eq!(fx.closed.load(Ordering::SeqCst), 1);
    assert_eq!(fx.connector.status("alice").await.status, ConnectorStatus::Disconnected);
}

#[tokio::test]
async fn delete_during_connect_closes_the_late_session() {
    let mut stub = factory(&[("web", vec!["search"])]);
    stub.slow.push("web".into());
    let fx = fixture(stub);
    let server = add(&fx, "alice", "web").await;

    let delete = async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(fx.connector.state(&server.id).await, ConnectionState::Connecting);
        fx.connector.forget(&server.id, "alice").await.unwrap();
        fx.connector.registry().remove(&server.id, "alice").await.unwrap();
    };
    let (connected, ()) = tokio::join!(fx.connector.connect(&server.id, "alice"), delete);

    assert!(matches!(connected, Err(McpError::NotFound(_))));
    assert_eq!(fx.closed.load(Ordering::SeqCst), 1);
    assert!(fx.connector.list_tools("alice").await.is_empty());
    assert_eq!(fx.connector.status("alice").await.status, ConnectorStatus::Disconnected);
    assert_eq!(fx.connector.state(&server.id).await, ConnectionState::Disconnected);
}
