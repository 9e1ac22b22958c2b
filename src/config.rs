//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.
//! Anything invalid here is fatal at startup - no turn is ever processed
//! with a half-loaded configuration.

use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
#[allow(dead_code)]
pub enum ConfigError {
    #[error("Failed to load environment variables: {0}")]
    EnvLoad(#[from] dotenvy::Error),

    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Invalid sensitive pattern '{name}': {message}")]
    InvalidPattern { name: String, message: String },
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0),
            port: 3000,
        }
    }
}

/// Model provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    Ollama,
    OpenAi,
}

/// Model capability configuration
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub provider: ModelProvider,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: "sqlcoder:15b".to_string(),
            api_key: None,
        }
    }
}

/// Per-turn resource limits
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Row cap applied to query results
    pub max_query_results: usize,
    /// Budget for a single database execution
    pub max_query_execution_time: Duration,
    /// Budget for a single model completion call
    pub max_response_generation_time: Duration,
    /// Most recent history turns included in prompts
    pub max_history_turns: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_query_results: 100,
            max_query_execution_time: Duration::from_secs(30),
            max_response_generation_time: Duration::from_secs(60),
            max_history_turns: 10,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub limits: Limits,
    pub cors: CorsConfig,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let server = ServerConfig {
            host: std::env::var("HOST")
                .ok()
                .and_then(|h| h.parse().ok())
                .unwrap_or_else(|| ServerConfig::default().host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or_else(|| ServerConfig::default().port),
        };

        let model = Self::load_model_config()?;
        let limits = Self::load_limits()?;

        let cors = CorsConfig {
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|| CorsConfig::default().allowed_origins),
        };

        Ok(Self {
            server,
            model,
            limits,
            cors,
        })
    }

    fn load_model_config() -> Result<ModelConfig, ConfigError> {
        let defaults = ModelConfig::default();

        let provider = match std::env::var("MODEL_PROVIDER").ok().as_deref() {
            None | Some("ollama") => ModelProvider::Ollama,
            Some("openai") => ModelProvider::OpenAi,
            Some(other) => {
                return Err(ConfigError::InvalidValue(format!(
                    "Unknown MODEL_PROVIDER '{}' (expected 'ollama' or 'openai')",
                    other
                )));
            }
        };

        let base_url = std::env::var("MODEL_BASE_URL").unwrap_or_else(|_| match provider {
            ModelProvider::Ollama => defaults.base_url.clone(),
            ModelProvider::OpenAi => "https://api.openai.com/v1".to_string(),
        });

        url::Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidValue(format!("Invalid MODEL_BASE_URL '{}': {}", base_url, e))
        })?;

        let api_key = std::env::var("MODEL_API_KEY").ok();
        if provider == ModelProvider::OpenAi && api_key.is_none() {
            return Err(ConfigError::MissingVar("MODEL_API_KEY".to_string()));
        }

        Ok(ModelConfig {
            provider,
            base_url,
            model: std::env::var("MODEL_NAME").unwrap_or(defaults.model),
            api_key,
        })
    }

    fn load_limits() -> Result<Limits, ConfigError> {
        let defaults = Limits::default();

        Ok(Limits {
            max_query_results: parse_env("MAX_QUERY_RESULTS", defaults.max_query_results)?,
            max_query_execution_time: Duration::from_secs(parse_env(
                "MAX_QUERY_EXECUTION_TIME",
                defaults.max_query_execution_time.as_secs(),
            )?),
            max_response_generation_time: Duration::from_secs(parse_env(
                "MAX_RESPONSE_GENERATION_TIME",
                defaults.max_response_generation_time.as_secs(),
            )?),
            max_history_turns: parse_env("MAX_HISTORY_TURNS", defaults.max_history_turns)?,
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{} must be a number, got '{}'", name, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, Ipv4Addr::new(0, 0, 0, 0));
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_query_results, 100);
        assert_eq!(limits.max_history_turns, 10);
        assert_eq!(limits.max_query_execution_time, Duration::from_secs(30));
    }
}
