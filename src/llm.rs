use crate::config::ModelConfig;
use crate::error::{AiqlError, Result};
use crate::prompt::Prompt;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Decoding options sent with every completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// 0.0 forces greedy decoding
    pub temperature: f32,
    /// Generation halts on any of these; kept in first-seen order without duplicates
    pub stop_sequences: Vec<String>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            stop_sequences: Vec::new(),
        }
    }
}

impl CompletionOptions {
    pub fn new<I, S>(temperature: f32, stop_sequences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut options = Self {
            temperature,
            stop_sequences: Vec::new(),
        };
        for stop in stop_sequences {
            options.push_stop(stop);
        }
        options
    }

    pub fn push_stop(&mut self, stop: impl Into<String>) {
        let stop = stop.into();
        if !self.stop_sequences.contains(&stop) {
            self.stop_sequences.push(stop);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
}

/// A language-model backend that turns a prompt into raw completion text.
#[async_trait]
pub trait CompletionSource: Send + Sync {
    async fn generate(
        &self,
        model_id: &str,
        prompt: &Prompt,
        options: &CompletionOptions,
    ) -> Result<Completion>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions<'a>,
}

#[derive(Debug, Serialize)]
struct GenerateOptions<'a> {
    temperature: f32,
    #[serde(skip_serializing_if = "no_stops")]
    stop: &'a [String],
}

fn no_stops(stop: &&[String]) -> bool {
    stop.is_empty()
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for a local Ollama server (`/api/generate`, non-streaming).
#[derive(Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::build(base_url.into(), None)
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        Self::build(config.base_url.clone(), config.timeout())
    }

    fn build(base_url: String, timeout: Option<std::time::Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AiqlError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl CompletionSource for OllamaClient {
    async fn generate(
        &self,
        model_id: &str,
        prompt: &Prompt,
        options: &CompletionOptions,
    ) -> Result<Completion> {
        let body = GenerateRequest {
            model: model_id,
            prompt: prompt.as_str(),
            stream: false,
            options: GenerateOptions {
                temperature: options.temperature,
                stop: &options.stop_sequences,
            },
        };

        info!("Requesting completion from model {}", model_id);
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    AiqlError::BackendUnavailable(format!(
                        "Ollama at {} unreachable: {}",
                        self.base_url, e
                    ))
                } else {
                    AiqlError::Llm(format!("Ollama request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AiqlError::BackendUnavailable(format!(
                "Model {} not available: {}",
                model_id, error_text
            )));
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AiqlError::Llm(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AiqlError::Llm(format!("Failed to parse Ollama response: {}", e)))?;

        debug!(chars = parsed.response.len(), "received completion");
        Ok(Completion {
            text: parsed.response,
        })
    }
}
