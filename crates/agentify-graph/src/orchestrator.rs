use agentify_llm::{ChatClient, Message};
use agentify_mcp::ToolServerConnector;
use agentify_persist::{NewMessage, PersistError, Thread, ThreadStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::builder::ChatOrchestratorBuilder;
use crate::error::{ChatError, Result};
use crate::history::to_llm_messages;
use crate::node::{Node, NodeType};
use crate::nodes::{LLMNode, ToolNode};
use crate::router::{NextNode, Router};
use crate::title::derive_title;
use crate::types::{ChatConfig, GraphState};

pub const ITERATION_LIMIT_NOTE: &str =
    "[Stopped: reached the maximum number of tool iterations for this message]";

#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub thread_id: String,
    pub thread_title: String,
    /// True when this turn opened the thread.
    pub created_thread: bool,
    pub response: String,
    /// Id of the stored assistant reply.
    pub message_id: String,
}

/// Runs one chat turn: thread bookkeeping around the LLM/tool loop.
pub struct ChatOrchestrator {
    threads: Arc<dyn ThreadStore>,
    connector: Arc<ToolServerConnector>,
    llm_node: LLMNode,
    tool_node: ToolNode,
    router: Box<dyn Router>,
    config: ChatConfig,
}

impl ChatOrchestrator {
    pub(crate) fn new(
        client: Arc<dyn ChatClient>,
        threads: Arc<dyn ThreadStore>,
        connector: Arc<ToolServerConnector>,
        router: Box<dyn Router>,
        config: ChatConfig,
    ) -> Self {
        Self {
            llm_node: LLMNode::new(client, config.llm_timeout),
            tool_node: ToolNode::new(connector.clone()),
            threads,
            connector,
            router,
            config,
        }
    }

    pub fn builder() -> ChatOrchestratorBuilder {
        ChatOrchestratorBuilder::new()
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Handle one user message, opening a thread when `thread_id` is `None`.
    ///
    /// The user message is stored before the provider is called and stays
    /// stored if the provider fails. A thread opened by this call is removed
    /// again when that first store fails. The reply and any tool records are
    /// stored together afterwards, or not at all.
    pub async fn handle(&self, user_id: &str, content: &str, thread_id: Option<&str>) -> Result<ChatOutcome> {
        if content.trim().is_empty() {
            return Err(ChatError::InvalidInput("message must not be empty".into()));
        }
        let start = Instant::now();

        let (thread, created_thread) = self.resolve_thread(user_id, content, thread_id).await?;

        if let Err(e) = self
            .threads
            .append_message(&thread.id, user_id, NewMessage::user(content))
            .await
        {
            tracing::error!(user_id, thread_id = %thread.id, error = %e, "Failed to store user message");
            if created_thread {
                self.discard_thread(&thread.id, user_id).await;
            }
            return Err(e.into());
        }

        let catalog = self.connector.list_tools(user_id).await;
        let history = self
            .threads
            .recent_messages(&thread.id, user_id, self.config.history_limit)
            .await?;

        let mut messages = Vec::with_capacity(history.len() + 1);
        if !self.config.system_prompt.is_empty() {
            messages.push(Message::system(self.config.system_prompt.as_str()));
        }
        messages.extend(to_llm_messages(&history));

        let mut state = GraphState::new(
            user_id,
            thread.id.clone(),
            messages,
            catalog.to_llm_tools(),
            self.config.llm.clone(),
        );

        if let Err(e) = self.run_loop(&mut state).await {
            tracing::warn!(user_id, thread_id = %thread.id, error = %e, "Chat turn failed, reply discarded");
            return Err(e);
        }

        let response = state.final_text();
        let stored = self
            .threads
            .append_messages(&thread.id, user_id, std::mem::take(&mut state.records))
            .await?;
        let message_id = stored
            .last()
            .map(|m| m.id.clone())
            .ok_or_else(|| ChatError::Persist(PersistError::Internal("turn produced no reply".into())))?;

        tracing::info!(
            user_id,
            thread_id = %thread.id,
            run_id = %state.run_id,
            tools_available = catalog.len(),
            records = stored.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Chat turn completed"
        );

        Ok(ChatOutcome {
            thread_id: thread.id,
            thread_title: thread.title,
            created_thread,
            response,
            message_id,
        })
    }

    async fn resolve_thread(&self, user_id: &str, content: &str, thread_id: Option<&str>) -> Result<(Thread, bool)> {
        match thread_id {
            Some(id) => Ok((self.threads.get_thread(id, user_id).await?, false)),
            None => {
                let thread = self
                    .threads
                    .create_thread(user_id, Some(derive_title(content)))
                    .await?;
                tracing::info!(user_id, thread_id = %thread.id, "Thread opened by first message");
                Ok((thread, true))
            }
        }
    }

    /// Drops a thread opened by a turn that never stored its first message.
    async fn discard_thread(&self, thread_id: &str, user_id: &str) {
        match self.threads.delete_thread(thread_id, user_id).await {
            Ok(()) => tracing::info!(user_id, thread_id, "Discarded empty thread"),
            Err(e) => tracing::warn!(user_id, thread_id, error = %e, "Failed to discard empty thread"),
        }
    }

    async fn run_loop(&self, state: &mut GraphState) -> Result<()> {
        let mut current = NodeType::LLM;
        let mut tool_rounds = 0;

        loop {
            match current {
                NodeType::LLM => self.llm_node.execute(state).await?,
                NodeType::Tool => {
                    self.tool_node.execute(state).await?;
                    tool_rounds += 1;
                }
            }

            current = match self.router.next(state, current) {
                NextNode::End => return Ok(()),
                NextNode::Tool => NodeType::Tool,
                NextNode::LLM if tool_rounds >= self.config.max_tool_iterations => {
                    tracing::warn!(
                        thread_id = %state.thread_id,
                        max = self.config.max_tool_iterations,
                        "Tool iteration limit reached"
                    );
                    state.append_note(ITERATION_LIMIT_NOTE);
                    return Ok(());
                }
                NextNode::LLM => NodeType::LLM,
            };
        }
    }
}
