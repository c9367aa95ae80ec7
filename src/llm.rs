//! Completion model clients.
//!
//! [`CompletionModel`] maps one fully formed prompt to generated text.
//! Failures are typed [`LlmError`]s and never returned as answer text.
//! Each call is attempted exactly once.
//!
//! | `llm.provider` | Client | Endpoint |
//! |----------------|--------|----------|
//! | `"openai"` | [`OpenAiCompatibleClient`] | `POST {url}/chat/completions` (Groq, OpenAI, vLLM, ...) |
//! | `"ollama"` | [`OllamaClient`] | `POST {url}/api/generate` |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::LlmError;

#[async_trait]
pub trait CompletionModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Send `prompt` as a single user message and return the reply verbatim.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ApiMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for any OpenAI-compatible chat completion API.
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompatibleClient {
    /// Build the client. A missing API key is reported on the first call,
    /// so retrieval-only commands still work without one.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            api_key_env: config.api_key_env.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl CompletionModel for OpenAiCompatibleClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::MissingApiKey(self.api_key_env.clone()))?;

        let body = ChatRequest {
            model: &self.model,
            messages: [ApiMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::error!(%status, body = %text, "completion request failed");
            return Err(LlmError::from_status(status, text));
        }

        let resp: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for a local Ollama server.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl CompletionModel for OllamaClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::error!(%status, body = %text, "Ollama generate request failed");
            return Err(LlmError::from_status(status, text));
        }

        let resp: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(resp.response)
    }
}

/// Create the configured [`CompletionModel`].
pub fn create_client(config: &LlmConfig) -> anyhow::Result<Box<dyn CompletionModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiCompatibleClient::new(config)?)),
        "ollama" => Ok(Box::new(OllamaClient::new(config)?)),
        other => anyhow::bail!("Unknown LLM provider: {}", other),
    }
}
