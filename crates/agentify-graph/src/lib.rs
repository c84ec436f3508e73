//! Chat orchestration for agentify.
//!
//! A chat turn records the user message, then runs an LLM node / tool node
//! loop driven by a router until the model answers without tool calls.

pub mod builder;
pub mod error;
pub mod history;
pub mod node;
pub mod nodes;
pub mod orchestrator;
pub mod router;
pub mod title;
pub mod types;

pub use builder::ChatOrchestratorBuilder;
pub use error::{ChatError, Result};
pub use node::{Node, NodeType};
pub use orchestrator::{ChatOrchestrator, ChatOutcome};
pub use router::{NextNode, Router, SimpleRouter};
pub use title::derive_title;
pub use types::{ChatConfig, GraphState, LLMConfig};
