//! Configuration system for the statviz server
//!
//! Loads configuration from:
//! 1. config.yaml - operational settings (port, store, interpreter, logging)
//! 2. .env file - secrets (API keys)
//!
//! Environment variables always override config.yaml values.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Path to the DuckDB database file
    pub path: String,

    /// Number of pooled read-only connections
    pub pool_size: usize,

    /// How long a request may wait for a connection
    pub acquire_timeout_ms: u64,

    /// Per-query time budget
    pub query_timeout_ms: u64,

    /// Row cap appended to unbounded statements
    pub max_rows: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: "data/sports.duckdb".to_string(),
            pool_size: 4,
            acquire_timeout_ms: 2_000,
            query_timeout_ms: 15_000,
            max_rows: 5_000,
        }
    }
}

impl StoreSettings {
    pub fn to_store_config(&self) -> statviz_store::StoreConfig {
        statviz_store::StoreConfig {
            pool_size: self.pool_size,
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
            query_timeout: Duration::from_millis(self.query_timeout_ms),
            max_rows: self.max_rows,
        }
    }
}

/// Interpreter (LLM) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpreterSettings {
    /// Chat model used for NL to SQL conversion
    pub model: String,

    /// Overall deadline for one interpretation, retries included
    pub timeout_ms: u64,

    /// Extra attempts after the first, for transient failures only
    pub max_retries: usize,
}

impl Default for InterpreterSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            timeout_ms: 20_000,
            max_retries: 2,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stdout, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "stdout".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreSettings,
    pub interpreter: InterpreterSettings,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from file when present, otherwise start from defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            let mut config = Config::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("STATVIZ_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("STATVIZ_SERVER_PORT") {
            if let Ok(port_num) = port.parse() {
                self.server.port = port_num;
            }
        }

        if let Ok(path) = std::env::var("STATVIZ_DB_PATH") {
            self.store.path = path;
        }
        if let Ok(max_rows) = std::env::var("STATVIZ_MAX_ROWS") {
            if let Ok(n) = max_rows.parse() {
                self.store.max_rows = n;
            }
        }

        if let Ok(model) = std::env::var("STATVIZ_LLM_MODEL") {
            self.interpreter.model = model;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.logging.directory = dir;
        }
    }

    /// Get OpenAI API key from environment (must be in .env)
    pub fn get_openai_api_key() -> Result<String, ConfigError> {
        std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))
    }

    /// Set logging environment variables for the logging module
    pub fn apply_logging_env(&self) {
        std::env::set_var("RUST_LOG", &self.logging.level);
        std::env::set_var("LOG_FORMAT", &self.logging.format);
        std::env::set_var("LOG_OUTPUT", &self.logging.output);
        std::env::set_var("LOG_DIR", &self.logging.directory);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.store.pool_size, 4);
        assert_eq!(config.store.max_rows, 5_000);
        assert_eq!(config.interpreter.model, "gpt-4o-mini");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_env_var_override() {
        std::env::set_var("STATVIZ_SERVER_PORT", "9090");
        std::env::set_var("STATVIZ_DB_PATH", "/tmp/test.duckdb");

        let config_yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080
store:
  path: "data/sports.duckdb"
  pool_size: 2
  acquire_timeout_ms: 1000
  query_timeout_ms: 5000
  max_rows: 100
interpreter:
  model: "gpt-4o-mini"
  timeout_ms: 10000
  max_retries: 1
logging:
  level: "info"
  format: "pretty"
  output: "stdout"
  directory: "./logs"
"#;
        let temp_file = std::env::temp_dir().join("test_statviz_config.yaml");
        std::fs::write(&temp_file, config_yaml).unwrap();

        let config = Config::load(&temp_file).unwrap();
        assert_eq!(config.server.port, 9090); // Overridden
        assert_eq!(config.store.path, "/tmp/test.duckdb"); // Overridden
        assert_eq!(config.store.pool_size, 2); // From file

        std::env::remove_var("STATVIZ_SERVER_PORT");
        std::env::remove_var("STATVIZ_DB_PATH");
        std::fs::remove_file(temp_file).ok();
    }

    #[test]
    fn test_partial_yaml_falls_back_to_defaults() {
        let config: Config = serde_yaml::from_str("server:\n  host: \"0.0.0.0\"\n  port: 3000\n").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.store.pool_size, 4);
    }
}
