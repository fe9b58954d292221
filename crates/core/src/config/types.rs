use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::orchestrator::OrchestratorConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Archivematica dashboard (processing pipeline) connection.
    pub pipeline: ServiceConfig,
    /// Storage Service connection.
    pub storage: ServiceConfig,
    pub reingest: OrchestratorConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub process: ProcessConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection details for one remote service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Base URL (e.g., "http://127.0.0.1:8000")
    pub url: String,
    /// Username the API key belongs to
    pub user: String,
    /// API key
    pub api_key: String,
}

/// HTTP transport configuration shared by both services
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Delay before the single retry of a transient failure (default: 500)
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

fn default_timeout() -> u32 {
    30
}

fn default_retry_delay() -> u64 {
    500
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("reingest.db")
}

/// Process lock configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessConfig {
    #[serde(default = "default_lock_path")]
    pub lock_path: PathBuf,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            lock_path: default_lock_path(),
        }
    }
}

fn default_lock_path() -> PathBuf {
    PathBuf::from("reingest.lck")
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Directory for the log file. Console only when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Default level: error, warn, info, debug or trace
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Write the log file as JSON lines
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            path: None,
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Sanitized config for logging (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub pipeline: SanitizedServiceConfig,
    pub storage: SanitizedServiceConfig,
    pub reingest: OrchestratorConfig,
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub process: ProcessConfig,
    pub logging: LoggingConfig,
}

/// Sanitized service config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedServiceConfig {
    pub url: String,
    pub user: String,
    pub api_key_configured: bool,
}

impl From<&ServiceConfig> for SanitizedServiceConfig {
    fn from(service: &ServiceConfig) -> Self {
        Self {
            url: service.url.clone(),
            user: service.user.clone(),
            api_key_configured: !service.api_key.is_empty(),
        }
    }
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            pipeline: SanitizedServiceConfig::from(&config.pipeline),
            storage: SanitizedServiceConfig::from(&config.storage),
            reingest: config.reingest.clone(),
            http: config.http.clone(),
            database: config.database.clone(),
            process: config.process.clone(),
            logging: config.logging.clone(),
        }
    }
}
