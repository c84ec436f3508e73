use agentify_llm::ChatClient;
use agentify_mcp::ToolServerConnector;
use agentify_persist::ThreadStore;
use std::sync::Arc;

use crate::error::{ChatError, Result};
use crate::orchestrator::ChatOrchestrator;
use crate::router::{Router, SimpleRouter};
use crate::types::ChatConfig;

/// Builder for a [`ChatOrchestrator`].
pub struct ChatOrchestratorBuilder {
    llm_client: Option<Arc<dyn ChatClient>>,
    threads: Option<Arc<dyn ThreadStore>>,
    connector: Option<Arc<ToolServerConnector>>,
    router: Option<Box<dyn Router>>,
    config: ChatConfig,
}

impl ChatOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            llm_client: None,
            threads: None,
            connector: None,
            router: None,
            config: ChatConfig::default(),
        }
    }

    pub fn llm_client(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.llm_client = Some(client);
        self
    }

    pub fn thread_store(mut self, threads: Arc<dyn ThreadStore>) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn connector(mut self, connector: Arc<ToolServerConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Replace the default LLM/tool router.
    pub fn router(mut self, router: Box<dyn Router>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn config(mut self, config: ChatConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<ChatOrchestrator> {
        let llm_client = self
            .llm_client
            .ok_or_else(|| ChatError::InvalidInput("LLM client is required".into()))?;
        let threads = self
            .threads
            .ok_or_else(|| ChatError::InvalidInput("thread store is required".into()))?;
        let connector = self
            .connector
            .ok_or_else(|| ChatError::InvalidInput("tool server connector is required".into()))?;

        if self.config.llm_timeout.is_zero() {
            return Err(ChatError::InvalidInput("llm timeout must be positive".into()));
        }
        if self.config.history_limit == 0 {
            return Err(ChatError::InvalidInput("history limit must be positive".into()));
        }

        Ok(ChatOrchestrator::new(
            llm_client,
            threads,
            connector,
            self.router.unwrap_or_else(|| Box::new(SimpleRouter)),
            self.config,
        ))
    }
}

impl Default for ChatOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
