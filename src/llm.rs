//! Language-model providers for narrative generation.
//!
//! - **[`OpenAiChat`]**: `POST {url}/v1/chat/completions` with a system and
//!   a user message.
//! - **[`OllamaChat`]**: `POST {url}/api/chat` with `stream: false`.
//!
//! [`create_language_model`] mirrors [`crate::embedding::create_embedder`]:
//! a disabled provider or a missing `OPENAI_API_KEY` yields
//! `Capability::Unavailable`, and the report uses the template narrative.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use mdna_core::capability::{Capability, LanguageModel, Prompt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::LlmConfig;
use crate::embedding::{OLLAMA_DEFAULT_URL, OPENAI_DEFAULT_URL};
use crate::http::{client, endpoint, failure, post_json};
use crate::timeout::TimeoutLanguageModel;

/// Resolve the configured language-model provider.
pub fn create_language_model(config: &LlmConfig) -> Result<Capability<dyn LanguageModel>> {
    let inner: Arc<dyn LanguageModel> = match config.provider.as_str() {
        "disabled" => return Ok(Capability::unavailable("language model provider is disabled")),
        "openai" => match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.is_empty() => Arc::new(OpenAiChat::new(config, key)?),
            _ => {
                warn!("llm.provider is 'openai' but OPENAI_API_KEY is not set");
                return Ok(Capability::unavailable("OPENAI_API_KEY environment variable not set"));
            }
        },
        "ollama" => Arc::new(OllamaChat::new(config)?),
        other => anyhow::bail!("Unknown llm provider: {}", other),
    };

    info!(provider = %config.provider, model = inner.model_name(), "language model enabled");
    let handle: Arc<dyn LanguageModel> = Arc::new(TimeoutLanguageModel::new(
        inner,
        Duration::from_secs(config.timeout_secs),
    ));
    Ok(Capability::available(handle))
}

fn messages(prompt: &Prompt) -> serde_json::Value {
    serde_json::json!([
        {"role": "system", "content": prompt.system},
        {"role": "user", "content": prompt.user},
    ])
}

fn required_model(config: &LlmConfig, provider: &str) -> Result<String> {
    config
        .model
        .clone()
        .ok_or_else(|| anyhow!("llm.model required for {} provider", provider))
}

// ============ OpenAI ============

pub struct OpenAiChat {
    model: String,
    url: String,
    api_key: String,
    temperature: f64,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            model: required_model(config, "OpenAI")?,
            url: endpoint(
                config.url.as_deref().unwrap_or(OPENAI_DEFAULT_URL),
                "/v1/chat/completions",
            ),
            api_key,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": messages(prompt),
        });
        let json = post_json(
            &self.client,
            &self.url,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_openai_completion(&json).map_err(failure)
    }
}

/// `choices[0].message.content`.
fn parse_openai_completion(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

// ============ Ollama ============

pub struct OllamaChat {
    model: String,
    url: String,
    temperature: f64,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            model: required_model(config, "Ollama")?,
            url: endpoint(config.url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL), "/api/chat"),
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages(prompt),
            "stream": false,
            "options": {"temperature": self.temperature},
        });
        let json = post_json(
            &self.client,
            &self.url,
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;
        parse_ollama_completion(&json).map_err(failure)
    }
}

/// `message.content`.
fn parse_ollama_completion(json: &serde_json::Value) -> Result<String> {
    json.pointer("/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing message.content"))
}
