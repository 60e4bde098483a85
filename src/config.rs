//! Application configuration
//!
//! Everything the collaborators need (model endpoint, decoding options,
//! database credentials) lives in one `AppConfig` that is built once at
//! startup and handed to the components that use it.

use crate::error::{AiqlError, Result};
use crate::extract::FallbackPolicy;
use crate::llm::CompletionOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model name as known to the Ollama server
    pub model_id: String,
    pub base_url: String,
    pub temperature: f32,
    pub stop_sequences: Vec<String>,
    /// Per-request timeout; `None` waits for the model indefinitely
    pub timeout_secs: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: "sqlcoder".to_string(),
            base_url: "http://localhost:11434".to_string(),
            temperature: 0.0,
            stop_sequences: vec!["Question:".to_string()],
            timeout_secs: None,
        }
    }
}

impl ModelConfig {
    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions::new(self.temperature, self.stop_sequences.iter().cloned())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            database: "aiql".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub database: DbConfig,
    /// Text file replacing the built-in schema context
    pub schema_context_path: Option<PathBuf>,
    pub strict_fallback: bool,
}

impl AppConfig {
    /// Loads `.env`, then an optional JSON file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AiqlError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| AiqlError::Config(format!("Invalid config JSON: {}", e)))
    }

    /// Overrides fields from variables returned by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("AIQL_MODEL") {
            self.model.model_id = model;
        }
        if let Some(url) = lookup("OLLAMA_URL") {
            self.model.base_url = url;
        }
        if let Some(temperature) = lookup("AIQL_TEMPERATURE") {
            self.model.temperature = parse_var("AIQL_TEMPERATURE", &temperature)?;
        }
        if let Some(stop) = lookup("AIQL_STOP") {
            self.model.stop_sequences = stop
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(timeout) = lookup("AIQL_TIMEOUT_SECS") {
            self.model.timeout_secs = Some(parse_var("AIQL_TIMEOUT_SECS", &timeout)?);
        }

        if let Some(host) = lookup("DB_HOST") {
            self.database.host = host;
        }
        if let Some(port) = lookup("DB_PORT") {
            self.database.port = parse_var("DB_PORT", &port)?;
        }
        if let Some(user) = lookup("DB_USER") {
            self.database.user = user;
        }
        if let Some(password) = lookup("DB_PASSWORD") {
            self.database.password = password;
        }
        if let Some(database) = lookup("DB_NAME") {
            self.database.database = database;
        }

        if let Some(path) = lookup("AIQL_SCHEMA_FILE") {
            self.schema_context_path = Some(PathBuf::from(path));
        }
        if let Some(strict) = lookup("AIQL_STRICT_FALLBACK") {
            self.strict_fallback = parse_var("AIQL_STRICT_FALLBACK", &strict)?;
        }
        Ok(())
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        if self.strict_fallback {
            FallbackPolicy::Strict
        } else {
            FallbackPolicy::Lenient
        }
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| AiqlError::Config(format!("Invalid value for {}: '{}' ({})", key, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.model.model_id, "sqlcoder");
        assert_eq!(config.model.temperature, 0.0);
        assert_eq!(config.database.port, 3306);
        assert_eq!(config.fallback_policy(), FallbackPolicy::Lenient);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = AppConfig::from_json(
            r#"{"database": {"user": "super", "password": "root"}, "strict_fallback": true}"#,
        )
        .unwrap();
        assert_eq!(config.database.user, "super");
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.model.base_url, "http://localhost:11434");
        assert_eq!(config.fallback_policy(), FallbackPolicy::Strict);
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("AIQL_MODEL", "tinyllama"),
            ("AIQL_TEMPERATURE", "0.2"),
            ("AIQL_STOP", "Question:, ```,"),
            ("DB_PORT", "3307"),
            ("DB_NAME", "calls_db"),
        ]);
        let mut config = AppConfig::default();
        config.apply_env(|key| vars.get(key).cloned()).unwrap();

        assert_eq!(config.model.model_id, "tinyllama");
        assert_eq!(config.model.temperature, 0.2);
        assert_eq!(config.model.stop_sequences, vec!["Question:", "```"]);
        assert_eq!(config.database.port, 3307);
        assert_eq!(config.database.database, "calls_db");
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let vars = env(&[("DB_PORT", "not-a-port")]);
        let mut config = AppConfig::default();
        let err = config.apply_env(|key| vars.get(key).cloned()).unwrap_err();
        assert!(matches!(err, AiqlError::Config(msg) if msg.contains("DB_PORT")));
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        assert!(matches!(
            AppConfig::from_json("{not json"),
            Err(AiqlError::Config(_))
        ));
    }
}
