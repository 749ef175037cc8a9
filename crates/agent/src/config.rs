//! Agent configuration, loaded from environment variables.

use serde::Deserialize;

/// Environment-driven configuration for the agent process.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// WebSocket base URL of the reactor (e.g. `wss://api.example.com`).
    #[serde(default)]
    pub reactor_url: String,

    /// Raw API key presented on the control plane.
    #[serde(default)]
    pub agent_key: String,

    #[serde(default)]
    pub mysql_dsn: String,

    #[serde(default)]
    pub postgres_dsn: String,

    #[serde(default)]
    pub mongo_uri: String,
}

impl AgentConfig {
    /// Loads configuration from the process environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::default())
            .build()?
            .try_deserialize()
    }

    /// Checks the required settings: the reactor URL and a database target.
    pub fn validate(&self) -> Result<(), String> {
        if self.reactor_url.is_empty() {
            return Err("missing configuration: REACTOR_URL is required".to_string());
        }
        if self.mysql_dsn.is_empty() && self.postgres_dsn.is_empty() && self.mongo_uri.is_empty() {
            return Err(
                "missing database configuration: set MYSQL_DSN, POSTGRES_DSN, or MONGO_URI"
                    .to_string(),
            );
        }
        Ok(())
    }
}
