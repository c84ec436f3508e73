use agentify_mcp::ToolServerConnector;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;
use crate::node::{Node, NodeType};
use crate::types::GraphState;

/// Runs the pending tool calls against the user's connected servers.
///
/// Failures become tool results so the model can react to them.
pub struct ToolNode {
    connector: Arc<ToolServerConnector>,
}

impl ToolNode {
    pub fn new(connector: Arc<ToolServerConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl Node for ToolNode {
    async fn execute(&self, state: &mut GraphState) -> Result<()> {
        for tool_call in state.get_pending_tool_calls() {
            let start = Instant::now();
            let name = tool_call.function.name.clone();

            let outcome = match tool_call.arguments_value() {
                Ok(args) => self
                    .connector
                    .call_tool(&state.user_id, &name, args)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(format!("invalid arguments: {}", e)),
            };

            let result = match outcome {
                Ok(output) if output.is_error => format!("Tool returned an error: {}", output.text),
                Ok(output) => output.text,
                Err(e) => {
                    tracing::warn!(thread_id = %state.thread_id, tool = %name, error = %e, "Tool call failed");
                    format!("Tool execution failed: {}", e)
                }
            };

            tracing::debug!(
                thread_id = %state.thread_id,
                tool = %name,
                duration_ms = start.elapsed().as_millis() as u64,
                "Tool call finished"
            );
            state.add_tool_result(tool_call.id, result);
        }

        Ok(())
    }

    fn node_type(&self) -> NodeType {
        NodeType::Tool
    }
}
