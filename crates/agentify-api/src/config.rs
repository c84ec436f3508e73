use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

const MAX_ACCESS_TTL_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub auth: AuthSettings,
    pub mcp: McpSettings,
    pub chat: ChatSettings,
    pub logging: LoggingConfig,

    // Secrets (from ENV only)
    #[serde(skip)]
    pub jwt_secret: String,
    #[serde(skip)]
    pub openai_api_key: String,
    #[serde(skip)]
    pub mongodb_uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub enabled: bool,
    #[serde(default)]
    pub origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Mongodb,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl From<&LlmConfig> for agentify_graph::LLMConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub session_cleanup_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct McpSettings {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatSettings {
    pub history_limit: usize,
    pub max_tool_iterations: usize,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Config {
    /// Load configuration from TOML files and environment variables.
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (if ENV is set)
    /// 3. `AGENTIFY_<SECTION>__<KEY>` environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let config = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("AGENTIFY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut cfg: Config = config.try_deserialize()?;
        cfg.load_secrets(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Secrets never come from files.
    pub fn load_secrets(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::Message(format!("{} environment variable is required", key)))
        };

        self.jwt_secret = required("JWT_SECRET")?;
        self.openai_api_key = required("OPENAI_API_KEY")?;
        self.mongodb_uri = match self.storage.backend {
            StorageBackend::Mongodb => Some(required("MONGODB_URI")?),
            StorageBackend::Memory => None,
        };
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Message(msg.to_string()));

        if !(1..=MAX_ACCESS_TTL_MINUTES).contains(&self.auth.access_token_ttl_minutes) {
            return invalid("auth.access_token_ttl_minutes must be between 1 and 1440");
        }
        if self.auth.refresh_token_ttl_days < 1 {
            return invalid("auth.refresh_token_ttl_days must be at least 1");
        }
        if self.auth.session_cleanup_interval_secs == 0 {
            return invalid("auth.session_cleanup_interval_secs must be positive");
        }
        if self.llm.timeout_secs == 0 || self.mcp.connect_timeout_secs == 0 || self.mcp.request_timeout_secs == 0 {
            return invalid("timeouts must be positive");
        }
        if self.chat.history_limit == 0 || self.chat.max_tool_iterations == 0 {
            return invalid("chat.history_limit and chat.max_tool_iterations must be positive");
        }
        if self.storage.database.trim().is_empty() {
            return invalid("storage.database must not be empty");
        }
        Ok(())
    }

    pub fn auth_config(&self) -> agentify_auth::AuthConfig {
        agentify_auth::AuthConfig::new(self.jwt_secret.clone())
            .with_access_ttl(chrono::Duration::minutes(self.auth.access_token_ttl_minutes))
            .with_refresh_ttl(chrono::Duration::days(self.auth.refresh_token_ttl_days))
    }

    pub fn chat_config(&self) -> agentify_graph::ChatConfig {
        let mut chat = agentify_graph::ChatConfig::new()
            .with_llm((&self.llm).into())
            .with_timeout(Duration::from_secs(self.llm.timeout_secs))
            .with_history_limit(self.chat.history_limit)
            .with_max_tool_iterations(self.chat.max_tool_iterations);
        if let Some(prompt) = &self.chat.system_prompt {
            chat = chat.with_system_prompt(prompt.clone());
        }
        chat
    }

    pub fn connector_timeouts(&self) -> agentify_mcp::ConnectorTimeouts {
        agentify_mcp::ConnectorTimeouts {
            connect: Duration::from_secs(self.mcp.connect_timeout_secs),
            request: Duration::from_secs(self.mcp.request_timeout_secs),
        }
    }

    pub fn session_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.auth.session_cleanup_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML: &str = r#"
        [server]
        host = "127.0.0.1"
        port = 8000

        [cors]
        enabled = true
        origins = ["http://localhost:3000"]

        [storage]
        backend = "mongodb"
        database = "agentify"

        [llm]
        model = "gpt-4o"
        temperature = 0.7
        timeout_secs = 60

        [auth]
        access_token_ttl_minutes = 30
        refresh_token_ttl_days = 7
        session_cleanup_interval_secs = 3600

        [mcp]
        connect_timeout_secs = 30
        request_timeout_secs = 60

        [chat]
        history_limit = 20
        max_tool_iterations = 10

        [logging]
        level = "debug"
        format = "json"
    "#;

    fn secrets(key: &str) -> Option<String> {
        match key {
            "JWT_SECRET" => Some("0123456789abcdef0123".into()),
            "OPENAI_API_KEY" => Some("sk-test".into()),
            "MONGODB_URI" => Some("mongodb://localhost:27017".into()),
            _ => None,
        }
    }

    #[test]
    fn parses_all_sections() {
        let mut config: Config = toml::from_str(TOML).unwrap();
        config.load_secrets(secrets).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.storage.backend, StorageBackend::Mongodb);
        assert_eq!(config.mongodb_uri.as_deref(), Some("mongodb://localhost:27017"));
        assert_eq!(config.chat_config().history_limit, 20);
        assert_eq!(config.auth_config().access_token_ttl, chrono::Duration::minutes(30));
    }

    #[test]
    fn access_ttl_above_a_day_is_rejected() {
        let mut config: Config = toml::from_str(TOML).unwrap();
        config.auth.access_token_ttl_minutes = 1441;
        assert!(config.validate().is_err());
    }

    #[test]
    fn mongodb_backend_requires_uri() {
        let mut config: Config = toml::from_str(TOML).unwrap();
        let err = config
            .load_secrets(|key| if key == "MONGODB_URI" { None } else { secrets(key) })
            .unwrap_err();
        assert!(err.to_string().contains("MONGODB_URI"));

        config.storage.backend = StorageBackend::Memory;
        config
            .load_secrets(|key| if key == "MONGODB_URI" { None } else { secrets(key) })
            .unwrap();
        assert!(config.mongodb_uri.is_none());
    }

    #[test]
    fn unknown_backend_fails_to_parse() {
        let toml = TOML.replace(r#"backend = "mongodb""#, r#"backend = "sqlite""#);
        assert!(toml::from_str::<Config>(&toml).is_err());
    }
}
