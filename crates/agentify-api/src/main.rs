use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use agentify_api::{
    app::{build_router, server_address},
    config::{Config, StorageBackend},
    state::AppState,
};
use agentify_llm::{ChatClient, OpenAIClient};
use agentify_mcp::RmcpSessionFactory;
use agentify_persist::{MemoryPersistenceClient, PersistenceClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    init_logging(&config);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Agentify API server");

    let mut llm = OpenAIClient::new(config.openai_api_key.clone())?;
    if let Some(base_url) = &config.llm.base_url {
        llm = llm.with_base_url(base_url.clone());
    }
    let llm_client: Arc<dyn ChatClient> = Arc::new(llm);

    let state = match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, data is lost on restart");
            build_state(config, Arc::new(MemoryPersistenceClient::new()), llm_client)?
        }
        StorageBackend::Mongodb => connect_mongodb(config, llm_client).await?,
    };

    let cleared = state.connector.reset_persisted_flags().await?;
    if cleared > 0 {
        tracing::info!(cleared, "Cleared stale tool server connection flags");
    }

    let sweeper = state
        .auth
        .clone()
        .spawn_session_sweeper(state.config.session_cleanup_interval());

    let addr = server_address(&state.config);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check: http://{}/health", addr);
    tracing::info!("API docs: http://{}/api/docs", addr);

    let connector = state.connector.clone();
    let app = build_router(Arc::new(state));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    connector.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}

fn build_state<C>(config: Config, persistence: Arc<C>, llm_client: Arc<dyn ChatClient>) -> anyhow::Result<AppState>
where
    C: PersistenceClient + 'static,
{
    Ok(AppState::new(config, persistence, llm_client, Arc::new(RmcpSessionFactory))?)
}

#[cfg(feature = "mongodb")]
async fn connect_mongodb(config: Config, llm_client: Arc<dyn ChatClient>) -> anyhow::Result<AppState> {
    let uri = config
        .mongodb_uri
        .clone()
        .ok_or_else(|| anyhow::anyhow!("MONGODB_URI environment variable is required"))?;
    let client = agentify_persist::MongoPersistenceClient::connect(&uri, &config.storage.database).await?;
    build_state(config, Arc::new(client), llm_client)
}

#[cfg(not(feature = "mongodb"))]
async fn connect_mongodb(_config: Config, _llm_client: Arc<dyn ChatClient>) -> anyhow::Result<AppState> {
    anyhow::bail!("storage.backend = \"mongodb\" needs a build with the `mongodb` feature")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format.as_str() {
        "json" => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        _ => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
    }
}
