use agentify_api::{build_router, config::Config, state::AppState};
use agentify_llm::{ChatClient, ChatRequest, ChatResponse};
use agentify_mcp::{SessionFactory, ToolInfo, ToolOutput, ToolSession};
use agentify_persist::{MemoryPersistenceClient, ToolServer};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const CONFIG: &str = r#"
    [server]
    host = "127.0.0.1"
    port = 0

    [cors]
    enabled = false

    [storage]
    backend = "memory"
    database = "agentify_test"

    [llm]
    model = "gpt-4o-mini"
    timeout_secs = 5

    [auth]
    access_token_ttl_minutes = 30
    refresh_token_ttl_days = 7
    session_cleanup_interval_secs = 3600

    [mcp]
    connect_timeout_secs = 2
    request_timeout_secs = 2

    [chat]
    history_limit = 20
    max_tool_iterations = 3

    [logging]
    level = "warn"
    format = "pretty"
"#;

struct CannedClient;

#[async_trait]
impl ChatClient for CannedClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let last = request.messages.last().map(|m| m.text()).unwrap_or_default();
        Ok(ChatResponse::text(format!("echo: {}", last)))
    }
}

/// Connects to anything except servers named "offline".
struct StubFactory;

struct StubSession;

#[async_trait]
impl ToolSession for StubSession {
    async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        Ok(vec![ToolInfo {
            name: "lookup".into(),
            description: Some("Look something up".into()),
            input_schema: json!({"type": "object"}),
        }])
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput> {
        Ok(ToolOutput {
            text: format!("{}:{}", name, arguments),
            is_error: false,
        })
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl SessionFactory for StubFactory {
    async fn open(&self, server: &ToolServer) -> Result<Box<dyn ToolSession>> {
        if server.name == "offline" {
            return Err(anyhow!("connection refused"));
        }
        Ok(Box::new(StubSession))
    }
}

fn app() -> Router {
    let mut config: Config = toml::from_str(CONFIG).unwrap();
    config
        .load_secrets(|key| match key {
            "JWT_SECRET" => Some("integration-test-secret-0123456789".into()),
            "OPENAI_API_KEY" => Some("sk-test".into()),
            _ => None,
        })
        .unwrap();
    config.validate().unwrap();

    let state = AppState::new(
        config,
        Arc::new(MemoryPersistenceClient::new()),
        Arc::new(CannedClient),
        Arc::new(StubFactory),
    )
    .unwrap();
    build_router(Arc::new(state))
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Registers and logs in; returns (access_token, refresh_token).
async fn sign_up(app: &Router, username: &str) -> (String, String) {
    let (status, _) = send(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": "correct horse battery",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"username": username, "password": "correct horse battery"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    (
        body["access_token"].as_str().unwrap().to_string(),
        body["refresh_token"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn health_reports_storage() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["services"]["storage"], "connected");
}

#[tokio::test]
async fn register_login_and_profile() {
    let app = app();
    let (access, _) = sign_up(&app, "alice").await;

    let (status, body) = send(&app, Method::GET, "/api/users/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["email"], "alice@example.com");
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn duplicate_username_conflicts() {
    let app = app();
    sign_up(&app, "alice").await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({"username": "alice", "email": "other@example.com", "password": "correct horse battery"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = app();
    sign_up(&app, "alice").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"username": "alice", "password": "not the password"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn missing_token_is_challenged() {
    let app = app();
    let response = app
        .clone()
        .oneshot(Request::get("/api/threads").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");

    let (status, _) = send(&app, Method::GET, "/api/threads", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_token_is_single_use() {
    let app = app();
    let (_, refresh) = sign_up(&app, "alice").await;

    let (status, rotated) = send(
        &app,
        Method::POST,
        "/api/auth/refresh",
        None,
        Some(json!({"refresh_token": refresh})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(rotated["refresh_token"], json!(refresh));
    assert_eq!(rotated["token_type"], "bearer");
    assert_eq!(rotated["user"]["username"], "alice");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/refresh",
        None,
        Some(json!({"refresh_token": refresh})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let access = rotated["access_token"].as_str().unwrap();
    let (status, _) = send(&app, Method::GET, "/api/users/me", Some(access), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn logout_revokes_refresh_token() {
    let app = app();
    let (access, refresh) = sign_up(&app, "alice").await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/logout",
        Some(&access),
        Some(json!({"refresh_token": refresh})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/refresh",
        None,
        Some(json!({"refresh_token": refresh})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_cannot_revoke_another_users_session() {
    let app = app();
    let (alice, _) = sign_up(&app, "alice").await;
    let (_, bobs_refresh) = sign_up(&app, "bob").await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/logout",
        Some(&alice),
        Some(json!({"refresh_token": bobs_refresh})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, rotated) = send(
        &app,
        Method::POST,
        "/api/auth/refresh",
        None,
        Some(json!({"refresh_token": bobs_refresh})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rotated["user"]["username"], "bob");
}

#[tokio::test]
async fn first_message_creates_titled_thread() {
    let app = app();
    let (access, _) = sign_up(&app, "alice").await;

    let (status, reply) = send(&app, Method::POST, "/api/chat", Some(&access), Some(json!({"message": "Hello"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["response"], "echo: Hello");
    assert_eq!(reply["thread_title"], "Hello");
    let thread_id = reply["thread_id"].as_str().unwrap().to_string();

    let (status, threads) = send(&app, Method::GET, "/api/threads", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(threads.as_array().unwrap().len(), 1);
    assert_eq!(threads[0]["id"], json!(thread_id));
    assert_eq!(threads[0]["message_count"], 2);

    let uri = format!("/api/threads/{}/messages", thread_id);
    let (status, messages) = send(&app, Method::GET, &uri, Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    let roles: Vec<&str> = messages
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["user", "assistant"]);
    assert_eq!(messages[1]["id"], reply["message_id"]);
}

#[tokio::test]
async fn long_first_message_gets_shortened_title() {
    let app = app();
    let (access, _) = sign_up(&app, "alice").await;

    let (_, reply) = send(
        &app,
        Method::POST,
        "/api/chat",
        Some(&access),
        Some(json!({"message": "What is the weather like in Lisbon today"})),
    )
    .await;
    assert_eq!(reply["thread_title"], "What is the weather...");
}

#[tokio::test]
async fn blank_message_is_rejected() {
    let app = app();
    let (access, _) = sign_up(&app, "alice").await;

    let (status, _) = send(&app, Method::POST, "/api/chat", Some(&access), Some(json!({"message": "   "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, threads) = send(&app, Method::GET, "/api/threads", Some(&access), None).await;
    assert!(threads.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn threads_are_private() {
    let app = app();
    let (alice, _) = sign_up(&app, "alice").await;
    let (bob, _) = sign_up(&app, "bob").await;

    let (_, reply) = send(&app, Method::POST, "/api/chat", Some(&alice), Some(json!({"message": "secret plans"}))).await;
    let thread_id = reply["thread_id"].as_str().unwrap();

    let uri = format!("/api/threads/{}/messages", thread_id);
    let (status, _) = send(&app, Method::GET, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/chat",
        Some(&bob),
        Some(json!({"message": "hi", "thread_id": thread_id})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let uri = format!("/api/threads/{}", thread_id);
    let (status, _) = send(&app, Method::DELETE, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn thread_rename_and_delete() {
    let app = app();
    let (access, _) = sign_up(&app, "alice").await;

    let (status, thread) = send(&app, Method::POST, "/api/threads", Some(&access), Some(json!({}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(thread["title"], "New Chat");
    let uri = format!("/api/threads/{}", thread["id"].as_str().unwrap());

    let (status, renamed) = send(&app, Method::PATCH, &uri, Some(&access), Some(json!({"title": "Trip"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["title"], "Trip");

    let (status, _) = send(&app, Method::PATCH, &uri, Some(&access), Some(json!({"title": " "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&access), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, threads) = send(&app, Method::GET, "/api/threads", Some(&access), None).await;
    assert!(threads.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn tool_server_lifecycle() {
    let app = app();
    let (access, _) = sign_up(&app, "alice").await;

    let (status, server) = send(
        &app,
        Method::POST,
        "/api/mcp/servers",
        Some(&access),
        Some(json!({
            "name": "search",
            "server_type": "direct",
            "configuration": {"url": "http://localhost:9000/mcp"},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(server["server_type"], "direct");
    assert_eq!(server["configuration"]["url"], "http://localhost:9000/mcp");
    assert_eq!(server["is_active"], false);
    let server_id = server["id"].as_str().unwrap().to_string();

    let (status, _) = send(&app, Method::GET, "/api/mcp/status", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/api/mcp/servers/{}/connect", server_id);
    let (status, connection) = send(&app, Method::POST, &uri, Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(connection["tools"], json!(["lookup"]));

    let (_, status_report) = send(&app, Method::GET, "/api/mcp/status", Some(&access), None).await;
    assert_eq!(status_report["status"], "connected");
    assert_eq!(status_report["tools_count"], 1);

    let (_, tools) = send(&app, Method::GET, "/api/mcp/tools", Some(&access), None).await;
    assert_eq!(tools[0]["name"], "lookup");
    assert_eq!(tools[0]["server_id"], json!(server_id));

    let (_, servers) = send(&app, Method::GET, "/api/mcp/servers", Some(&access), None).await;
    assert_eq!(servers[0]["is_active"], true);

    let uri = format!("/api/mcp/servers/{}/disconnect", server_id);
    let (status, _) = send(&app, Method::POST, &uri, Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, status_report) = send(&app, Method::GET, "/api/mcp/status", Some(&access), None).await;
    assert_eq!(status_report["status"], "disconnected");

    let uri = format!("/api/mcp/servers/{}", server_id);
    let (status, _) = send(&app, Method::DELETE, &uri, Some(&access), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, servers) = send(&app, Method::GET, "/api/mcp/servers", Some(&access), None).await;
    assert!(servers.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn failed_connect_is_reported() {
    let app = app();
    let (access, _) = sign_up(&app, "alice").await;

    let (_, server) = send(
        &app,
        Method::POST,
        "/api/mcp/servers",
        Some(&access),
        Some(json!({
            "name": "offline",
            "server_type": "remote",
            "configuration": {"command": "npx", "args": ["some-server"]},
        })),
    )
    .await;
    let uri = format!("/api/mcp/servers/{}/connect", server["id"].as_str().unwrap());

    let (status, body) = send(&app, Method::POST, &uri, Some(&access), None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("connection refused"));

    let (_, status_report) = send(&app, Method::GET, "/api/mcp/status", Some(&access), None).await;
    assert_eq!(status_report["status"], "error");
}

#[tokio::test]
async fn invalid_server_configuration_is_rejected() {
    let app = app();
    let (access, _) = sign_up(&app, "alice").await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/mcp/servers",
        Some(&access),
        Some(json!({"name": "broken", "server_type": "direct", "configuration": {"command": "npx"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/mcp/servers",
        Some(&access),
        Some(json!({"name": "broken", "server_type": "carrier-pigeon", "configuration": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tool_servers_are_private() {
    let app = app();
    let (alice, _) = sign_up(&app, "alice").await;
    let (bob, _) = sign_up(&app, "bob").await;

    let (_, server) = send(
        &app,
        Method::POST,
        "/api/mcp/servers",
        Some(&alice),
        Some(json!({
            "name": "search",
            "server_type": "direct",
            "configuration": {"url": "http://localhost:9000/mcp"},
        })),
    )
    .await;
    let server_id = server["id"].as_str().unwrap();

    let (_, servers) = send(&app, Method::GET, "/api/mcp/servers", Some(&bob), None).await;
    assert!(servers.as_array().unwrap().is_empty());

    let uri = format!("/api/mcp/servers/{}/connect", server_id);
    let (status, _) = send(&app, Method::POST, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let uri = format!("/api/mcp/servers/{}", server_id);
    let (status, _) = send(&app, Method::PATCH, &uri, Some(&bob), Some(json!({"name": "mine now"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

async fn save_llm_config(app: &Router, token: &str, name: &str, is_default: bool) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/llm/configurations",
        Some(token),
        Some(json!({
            "name": name,
            "provider": "openai",
            "model_name": "gpt-4o",
            "configuration": {"temperature": 0.3},
            "is_default": is_default,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

#[tokio::test]
async fn llm_configuration_default_is_exclusive() {
    let app = app();
    let (access, _) = sign_up(&app, "alice").await;

    let first = save_llm_config(&app, &access, "work", true).await;
    assert_eq!(first["is_default"], true);
    assert_eq!(first["is_active"], true);
    assert_eq!(first["configuration"]["temperature"], 0.3);
    let second = save_llm_config(&app, &access, "home", true).await;

    let (status, configs) = send(&app, Method::GET, "/api/llm/configurations", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(configs.as_array().unwrap().len(), 2);
    assert_eq!(configs[0]["id"], second["id"]);
    assert_eq!(configs[0]["is_default"], true);
    assert_eq!(configs[1]["is_default"], false);

    let uri = format!("/api/llm/configurations/{}", first["id"].as_str().unwrap());
    let (status, updated) = send(
        &app,
        Method::PATCH,
        &uri,
        Some(&access),
        Some(json!({"is_default": true, "model_name": "gpt-4o-mini"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["model_name"], "gpt-4o-mini");
    assert_eq!(updated["name"], "work");

    let (_, configs) = send(&app, Method::GET, "/api/llm/configurations", Some(&access), None).await;
    let defaults: Vec<&Value> = configs
        .as_array()
        .unwrap()
        .iter()
        .filter(|c| c["is_default"] == true)
        .collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0]["id"], first["id"]);

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&access), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, configs) = send(&app, Method::GET, "/api/llm/configurations", Some(&access), None).await;
    assert_eq!(configs.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn llm_configurations_are_private() {
    let app = app();
    let (alice, _) = sign_up(&app, "alice").await;
    let (bob, _) = sign_up(&app, "bob").await;

    let config = save_llm_config(&app, &alice, "work", true).await;
    save_llm_config(&app, &bob, "bobs", true).await;

    let (_, configs) = send(&app, Method::GET, "/api/llm/configurations", Some(&bob), None).await;
    assert_eq!(configs.as_array().unwrap().len(), 1);
    assert_eq!(configs[0]["name"], "bobs");

    let uri = format!("/api/llm/configurations/{}", config["id"].as_str().unwrap());
    let (status, _) = send(&app, Method::PATCH, &uri, Some(&bob), Some(json!({"name": "mine now"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::DELETE, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, configs) = send(&app, Method::GET, "/api/llm/configurations", Some(&alice), None).await;
    assert_eq!(configs[0]["name"], "work");
    assert_eq!(configs[0]["is_default"], true);
}

#[tokio::test]
async fn invalid_llm_configuration_is_rejected() {
    let app = app();
    let (access, _) = sign_up(&app, "alice").await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/llm/configurations",
        Some(&access),
        Some(json!({"name": " ", "provider": "openai", "model_name": "gpt-4o"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/llm/configurations",
        Some(&access),
        Some(json!({"name": "x", "provider": "openai", "model_name": "gpt-4o", "configuration": [1, 2]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
