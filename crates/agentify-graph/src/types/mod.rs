pub mod config;
pub mod state;

pub use config::{ChatConfig, LLMConfig, DEFAULT_SYSTEM_PROMPT};
pub use state::GraphState;
