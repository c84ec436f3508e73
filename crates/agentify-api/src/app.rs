use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{Config, CorsConfig};
use crate::docs::ApiDoc;
use crate::middleware::logging;
use crate::routes::{auth, chat, health, llm, mcp, threads};
use crate::state::AppState;

/// Longest a request may run; covers a chat turn with several tool rounds.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub fn build_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Auth
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/users/me", get(auth::me))
        // Threads
        .route("/threads", get(threads::list_threads).post(threads::create_thread))
        .route(
            "/threads/:thread_id",
            patch(threads::update_thread).delete(threads::delete_thread),
        )
        .route("/threads/:thread_id/messages", get(threads::list_messages))
        // Chat
        .route("/chat", post(chat::send_message))
        // Tool servers
        .route("/mcp/servers", get(mcp::list_servers).post(mcp::create_server))
        .route(
            "/mcp/servers/:server_id",
            patch(mcp::update_server).delete(mcp::delete_server),
        )
        .route("/mcp/servers/:server_id/connect", post(mcp::connect_server))
        .route("/mcp/servers/:server_id/disconnect", post(mcp::disconnect_server))
        .route("/mcp/status", get(mcp::status))
        .route("/mcp/tools", get(mcp::list_tools))
        // LLM configurations
        .route(
            "/llm/configurations",
            get(llm::list_configurations).post(llm::create_configuration),
        )
        .route(
            "/llm/configurations/:config_id",
            patch(llm::update_configuration).delete(llm::delete_configuration),
        );

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api_routes)
        .merge(SwaggerUi::new("/api/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(logging::log_request))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .layer(build_cors_layer(&state.config.cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    if !config.enabled {
        return CorsLayer::new();
    }

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if config.origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(origins)
}

/// `host:port` to bind.
pub fn server_address(config: &Config) -> String {
    format!("{}:{}", config.server.host, config.server.port)
}
