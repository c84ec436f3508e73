use agentify_llm::{ChatClient, ChatOptions, ChatRequest};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ChatError, Result};
use crate::node::{Node, NodeType};
use crate::types::GraphState;

pub struct LLMNode {
    client: Arc<dyn ChatClient>,
    timeout: Duration,
}

impl LLMNode {
    pub fn new(client: Arc<dyn ChatClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn build_request(state: &GraphState) -> ChatRequest {
        let mut options = ChatOptions::new().tools(state.tools.clone());
        if let Some(temperature) = state.llm_config.temperature {
            options = options.temperature(temperature);
        }
        if let Some(max_tokens) = state.llm_config.max_tokens {
            options = options.max_tokens(max_tokens);
        }
        ChatRequest::new(state.llm_config.model.clone(), state.messages.clone()).with_options(options)
    }
}

#[async_trait]
impl Node for LLMNode {
    async fn execute(&self, state: &mut GraphState) -> Result<()> {
        let request = Self::build_request(state);
        let start = Instant::now();

        // Partial output is dropped with the future on timeout.
        let response = tokio::time::timeout(self.timeout, self.client.chat(request))
            .await
            .map_err(|_| ChatError::Timeout(self.timeout))?
            .map_err(ChatError::Provider)?;

        tracing::debug!(
            run_id = %state.run_id,
            thread_id = %state.thread_id,
            tool_calls = response.tool_calls.as_ref().map_or(0, Vec::len),
            duration_ms = start.elapsed().as_millis() as u64,
            "LLM call completed"
        );

        state.add_ai_response(response)?;
        Ok(())
    }

    fn node_type(&self) -> NodeType {
        NodeType::LLM
    }
}
