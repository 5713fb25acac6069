//! Embedding providers.
//!
//! - **[`OpenAiEmbedder`]**: `POST {url}/v1/embeddings`, authenticated with
//!   `OPENAI_API_KEY`. `url` defaults to `https://api.openai.com`.
//! - **[`OllamaEmbedder`]**: `POST {url}/api/embed` on a local Ollama
//!   instance (default `http://localhost:11434`).
//!
//! Use [`create_embedder`] to turn an [`EmbeddingConfig`] into a
//! [`Capability`]. A disabled provider, or an OpenAI provider without an
//! API key, resolves to `Capability::Unavailable`; retrieval then runs in
//! fallback mode.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use mdna_core::capability::{Capability, Embedder};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::EmbeddingConfig;
use crate::http::{client, endpoint, failure, post_json};
use crate::timeout::TimeoutEmbedder;

pub const OPENAI_DEFAULT_URL: &str = "https://api.openai.com";
pub const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Resolve the configured embedding provider.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Capability<dyn Embedder>> {
    let inner: Arc<dyn Embedder> = match config.provider.as_str() {
        "disabled" => return Ok(Capability::unavailable("embedding provider is disabled")),
        "openai" => match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.is_empty() => Arc::new(OpenAiEmbedder::new(config, key)?),
            _ => {
                warn!("embedding.provider is 'openai' but OPENAI_API_KEY is not set");
                return Ok(Capability::unavailable("OPENAI_API_KEY environment variable not set"));
            }
        },
        "ollama" => Arc::new(OllamaEmbedder::new(config)?),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    };

    info!(provider = %config.provider, model = inner.model_name(), "embeddings enabled");
    let handle: Arc<dyn Embedder> = Arc::new(TimeoutEmbedder::new(
        inner,
        Duration::from_secs(config.timeout_secs),
    ));
    Ok(Capability::available(handle))
}

fn required_model(config: &EmbeddingConfig, provider: &str) -> Result<String> {
    config
        .model
        .clone()
        .ok_or_else(|| anyhow!("embedding.model required for {} provider", provider))
}

// ============ OpenAI ============

pub struct OpenAiEmbedder {
    model: String,
    url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            model: required_model(config, "OpenAI")?,
            url: endpoint(config.url.as_deref().unwrap_or(OPENAI_DEFAULT_URL), "/v1/embeddings"),
            api_key,
            max_retries: config.max_retries,
            client: client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
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
        parse_openai_response(&json).map_err(failure)
    }
}

/// Extract `data[].embedding`, ordered by `data[].index` when present.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());

    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);

        indexed.push((index, to_vector(embedding)));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn to_vector(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

// ============ Ollama ============

pub struct OllamaEmbedder {
    model: String,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            model: required_model(config, "Ollama")?,
            url: endpoint(config.url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL), "/api/embed"),
            max_retries: config.max_retries,
            client: client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
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
        parse_ollama_response(&json).map_err(failure)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .map(|values| to_vector(values))
                .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))
        })
        .collect()
}
