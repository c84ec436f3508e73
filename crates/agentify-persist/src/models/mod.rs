mod llm_config;
mod message;
mod session;
mod thread;
mod tool_server;
mod user;

pub use llm_config::{sort_for_listing, LlmConfiguration, LlmConfigurationPatch, NewLlmConfiguration};
pub use message::{Message, MessageRole, NewMessage};
pub use session::Session;
pub use thread::{Thread, ThreadPatch, ThreadSummary, DEFAULT_THREAD_TITLE};
pub use tool_server::{NewToolServer, ServerAuth, ServerConfig, ServerType, ToolServer, ToolServerPatch};
pub use user::{NewUser, User};
