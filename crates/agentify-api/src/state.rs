use agentify_auth::TokenAuthority;
use agentify_graph::ChatOrchestrator;
use agentify_llm::ChatClient;
use agentify_mcp::{SessionFactory, ToolServerConnector, ToolServerRegistry};
use agentify_persist::{PersistenceClient, Stores};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub persistence: Arc<dyn PersistenceClient>,
    pub stores: Stores,
    pub auth: Arc<TokenAuthority>,
    pub connector: Arc<ToolServerConnector>,
    pub chat: Arc<ChatOrchestrator>,
}

impl AppState {
    /// Wire every service over one storage backend.
    pub fn new<C>(
        config: Config,
        persistence: Arc<C>,
        llm_client: Arc<dyn ChatClient>,
        sessions: Arc<dyn SessionFactory>,
    ) -> ApiResult<Self>
    where
        C: PersistenceClient + 'static,
    {
        let stores = Stores::from_client(persistence.clone());

        let auth = TokenAuthority::new(config.auth_config(), stores.users.clone(), stores.sessions.clone())?;

        let connector = Arc::new(
            ToolServerConnector::new(ToolServerRegistry::new(stores.tool_servers.clone()), sessions)
                .with_timeouts(config.connector_timeouts()),
        );

        let chat = ChatOrchestrator::builder()
            .llm_client(llm_client)
            .thread_store(stores.threads.clone())
            .connector(connector.clone())
            .config(config.chat_config())
            .build()
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            persistence,
            stores,
            auth: Arc::new(auth),
            connector,
            chat: Arc::new(chat),
        })
    }
}
