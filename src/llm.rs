//! Generative text model abstraction and provider implementations.
//!
//! Defines the [`ChatModel`] trait and concrete implementations:
//! - **[`DisabledModel`]**: always fails; used when no provider is configured.
//! - **[`OpenAiChat`]**: calls the OpenAI chat completions API.
//! - **[`OllamaChat`]**: calls a local Ollama instance's `/api/chat` endpoint.
//!
//! Use [`create_model`] to pick one from the `[llm]` config section.
//!
//! # Deadlines
//!
//! Every call is wrapped in `tokio::time::timeout` using `llm.timeout_secs`;
//! expiry surfaces as [`Error::Timeout`]. Calls are never retried.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

/// A text-in, text-out generative model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    /// Send one user prompt and return the raw text of the reply.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Build the provider selected by `config.provider`.
pub fn create_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledModel)),
        "openai" => Ok(Arc::new(OpenAiChat::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        other => Err(Error::Config(format!("unknown llm provider: {}", other))),
    }
}

// ============ Disabled ============

pub struct DisabledModel;

#[async_trait]
impl ChatModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(Error::Upstream("llm provider is disabled".to_string()))
    }
}

// ============ OpenAI ============

/// Chat model backed by `POST /v1/chat/completions`.
///
/// The API key is read from the environment variable named by
/// `llm.api_key_env` (default `OPENAI_API_KEY`) at construction time.
pub struct OpenAiChat {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::Config("llm.model required for OpenAI provider".into()))?;
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            Error::Config(format!("{} environment variable not set", config.api_key_env))
        })?;

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            model,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            api_key,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let request = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send();

        let json = with_deadline(self.timeout_secs, async {
            let response = request.await.map_err(|e| {
                transport_error(e, self.timeout_secs, || "OpenAI request failed".to_string())
            })?;
            read_json("OpenAI", response).await
        })
        .await?;

        parse_openai_response(&json)
    }
}

/// Extract `choices[0].message.content`.
fn parse_openai_response(json: &Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Upstream("Invalid OpenAI response: missing message content".into()))
}

// ============ Ollama ============

/// Chat model backed by a local Ollama instance (default `http://localhost:11434`).
pub struct OllamaChat {
    client: reqwest::Client,
    model: String,
    url: String,
    timeout_secs: u64,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::Config("llm.model required for Ollama provider".into()))?;

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "stream": false,
            "options": { "temperature": 0 },
            "messages": [{ "role": "user", "content": prompt }],
        });

        let request = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&body)
            .send();

        let json = with_deadline(self.timeout_secs, async {
            let response = request.await.map_err(|e| {
                transport_error(e, self.timeout_secs, || {
                    format!("Ollama connection error (is Ollama running at {}?)", self.url)
                })
            })?;
            read_json("Ollama", response).await
        })
        .await?;

        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &Value) -> Result<String> {
    json.pointer("/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Upstream("Invalid Ollama response: missing message content".into()))
}

// ============ Shared plumbing ============

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))
}

fn transport_error(
    err: reqwest::Error,
    timeout_secs: u64,
    context: impl FnOnce() -> String,
) -> Error {
    if err.is_timeout() {
        Error::Timeout(timeout_secs)
    } else {
        Error::Upstream(format!("{}: {}", context(), err))
    }
}

async fn read_json(provider: &str, response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(Error::Upstream(format!(
            "{} API error {}: {}",
            provider, status, body_text
        )));
    }

    let json: Value = response
        .json()
        .await
        .map_err(|e| Error::Upstream(format!("{} returned invalid JSON: {}", provider, e)))?;
    debug!(provider, response = %json, "model response");
    Ok(json)
}

/// Run `fut` under a deadline, mapping expiry (including a client-side
/// reqwest timeout) to [`Error::Timeout`].
pub async fn with_deadline<T, F>(timeout_secs: u64, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(Duration::from_secs(timeout_secs), fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(timeout_secs)),
    }
}
