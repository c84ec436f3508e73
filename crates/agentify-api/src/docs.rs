use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::routes::{auth, chat, health, llm, mcp, threads};

#[derive(OpenApi)]
#[openapi(
    info(title = "Agentify API", description = "Chat backend with MCP tool servers"),
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::refresh,
        auth::logout,
        auth::me,
        threads::list_threads,
        threads::create_thread,
        threads::update_thread,
        threads::delete_thread,
        threads::list_messages,
        chat::send_message,
        mcp::list_servers,
        mcp::create_server,
        mcp::update_server,
        mcp::delete_server,
        mcp::connect_server,
        mcp::disconnect_server,
        mcp::status,
        mcp::list_tools,
        llm::list_configurations,
        llm::create_configuration,
        llm::update_configuration,
        llm::delete_configuration,
    ),
    components(schemas(
        health::HealthResponse,
        auth::RegisterRequest,
        auth::LoginRequest,
        auth::RefreshRequest,
        auth::UserResponse,
        auth::LoginResponse,
        threads::CreateThreadRequest,
        threads::UpdateThreadRequest,
        threads::ThreadResponse,
        threads::MessageResponse,
        chat::ChatRequest,
        chat::ChatResponse,
        mcp::CreateToolServerRequest,
        mcp::UpdateToolServerRequest,
        mcp::ToolServerResponse,
        mcp::ConnectionResponse,
        mcp::McpStatusResponse,
        mcp::ToolResponse,
        llm::CreateLlmConfigurationRequest,
        llm::UpdateLlmConfigurationRequest,
        llm::LlmConfigurationResponse,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "health"),
        (name = "auth", description = "Accounts and token sessions"),
        (name = "users"),
        (name = "threads", description = "Conversation threads"),
        (name = "chat"),
        (name = "mcp", description = "Tool servers"),
        (name = "llm", description = "Saved LLM configurations")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
