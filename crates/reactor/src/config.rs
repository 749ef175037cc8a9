//! Reactor configuration, loaded from environment variables.

use std::time::Duration;

use serde::Deserialize;

/// Environment-driven configuration for the reactor process.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Running environment (development|production).
    #[serde(default = "default_app_env")]
    pub app_env: String,

    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// Comma-separated list of CORS origins; `*` allows all.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: String,

    /// Connection string for the reactor's own MySQL store. Required.
    #[serde(default)]
    pub mysql_dsn: String,

    /// Where exports land: "local" or "s3".
    #[serde(default = "default_storage_type")]
    pub storage_type: String,

    #[serde(default = "default_local_storage_path")]
    pub local_storage_path: String,

    #[serde(default = "default_aws_region")]
    pub aws_region: String,

    #[serde(default)]
    pub s3_bucket: String,

    /// Custom endpoint for non-AWS S3 providers (MinIO and friends).
    #[serde(default)]
    pub s3_endpoint: String,

    #[serde(default)]
    pub s3_path_style: bool,

    #[serde(default)]
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub smtp_user: String,

    #[serde(default)]
    pub smtp_pass: String,

    #[serde(default = "default_smtp_from")]
    pub smtp_from: String,

    /// Number of concurrent export workers.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Global cap on concurrent database scans.
    #[serde(default = "default_max_db_concurrency")]
    pub max_db_concurrency: usize,

    /// Maximum duration of an export job, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout: u64,

    /// Gzip-compress exports.
    #[serde(default)]
    pub compression: bool,

    /// Attach small exports to the completion email.
    #[serde(default)]
    pub email_attach_file: bool,

    /// Shared secret for HMAC request signing. Empty disables verification
    /// (development only).
    #[serde(default)]
    pub api_secret: String,
}

fn default_app_env() -> String {
    "development".to_string()
}
fn default_server_port() -> u16 {
    8080
}
fn default_allowed_origins() -> String {
    "*".to_string()
}
fn default_storage_type() -> String {
    "s3".to_string()
}
fn default_local_storage_path() -> String {
    "./exports".to_string()
}
fn default_aws_region() -> String {
    "us-east-1".to_string()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_smtp_from() -> String {
    "noreply@example.com".to_string()
}
fn default_worker_count() -> usize {
    5
}
fn default_max_db_concurrency() -> usize {
    3
}
fn default_timeout_secs() -> u64 {
    900
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::default())
            .build()?
            .try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// Job deadline as a duration.
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout)
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Config {
        // Deserializing from an empty source exercises every serde default.
        config::Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = defaults();
        assert_eq!(config.app_env, "development");
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.storage_type, "s3");
        assert_eq!(config.worker_count, 5);
        assert_eq!(config.max_db_concurrency, 3);
        assert_eq!(config.default_timeout, 900);
        assert!(!config.compression);
        assert!(!config.email_attach_file);
        assert!(config.api_secret.is_empty());
        assert!(!config.is_production());
    }

    #[test]
    fn test_job_timeout() {
        let config = defaults();
        assert_eq!(config.job_timeout(), Duration::from_secs(900));
    }

    #[test]
    fn test_allowed_origins_parsing() {
        let mut config = defaults();
        config.allowed_origins = "https://a.example, https://b.example".to_string();
        assert_eq!(
            config.allowed_origins(),
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(defaults().allowed_origins(), vec!["*"]);
    }
}
