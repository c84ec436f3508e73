use async_trait::async_trait;

use crate::error::Result;
use crate::types::GraphState;

/// One step of the chat loop.
#[async_trait]
pub trait Node: Send + Sync {
    async fn execute(&self, state: &mut GraphState) -> Result<()>;

    fn node_type(&self) -> NodeType;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    LLM,
    Tool,
}
