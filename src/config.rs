use anyhow::{Context, Result};
use mdna_core::chunk::{SplitterConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use mdna_core::metrics::{MetricsOptions, YoyPolicy, DEFAULT_CHART_WINDOW};
use mdna_core::narrative::NarrativeThresholds;
use mdna_core::report::PipelineSettings;
use mdna_core::retrieval::{DEFAULT_QUERY, DEFAULT_TOP_K};
use serde::Deserialize;
use std::path::Path;

/// Config file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./config/mdna.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub narrative: NarrativeThresholds,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_query")]
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            query: default_query(),
            top_k: DEFAULT_TOP_K,
        }
    }
}

fn default_query() -> String {
    DEFAULT_QUERY.to_string()
}
fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default)]
    pub yoy_policy: YoyPolicy,
    #[serde(default = "default_chart_window")]
    pub chart_window: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            yoy_policy: YoyPolicy::default(),
            chart_window: DEFAULT_CHART_WINDOW,
        }
    }
}

fn default_chart_window() -> usize {
    DEFAULT_CHART_WINDOW
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL for Ollama (and OpenAI-compatible gateways).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    0
}
fn default_embedding_timeout_secs() -> u64 {
    30
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_temperature() -> f64 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// CORS origins. Empty allows any origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            allowed_origins: default_allowed_origins(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}
fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl Config {
    /// Built-in configuration: every section at its defaults, no providers.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Splitter, metrics, retrieval and narrative settings for the pipeline.
    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        let splitter = SplitterConfig::new(self.chunking.chunk_size, self.chunking.chunk_overlap)
            .context("Invalid [chunking] settings")?;
        Ok(PipelineSettings {
            metrics: MetricsOptions {
                yoy_policy: self.metrics.yoy_policy,
                chart_window: self.metrics.chart_window,
            },
            splitter,
            query: self.retrieval.query.clone(),
            top_k: self.retrieval.top_k,
            thresholds: self.narrative,
        })
    }
}

/// Load `path`, or the built-in config when no path was given and the
/// default file does not exist.
pub fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                load_config(default)
            } else {
                tracing::debug!("no config file at {}; using defaults", DEFAULT_CONFIG_PATH);
                Ok(Config::minimal())
            }
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap * 2 >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be less than half of chunking.chunk_size");
    }

    // Validate retrieval and metrics
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.metrics.chart_window < 1 {
        anyhow::bail!("metrics.chart_window must be >= 1");
    }

    let n = &config.narrative;
    if n.stable_volatility_ratio < 0.0 || n.strong_growth_pct < 0.0 || n.favorable_market_pct < 0.0 {
        anyhow::bail!("narrative thresholds must be non-negative");
    }

    // Validate providers
    for (section, provider, model) in [
        ("embedding", &config.embedding.provider, &config.embedding.model),
        ("llm", &config.llm.provider, &config.llm.model),
    ] {
        match provider.as_str() {
            "disabled" => {}
            "openai" | "ollama" => {
                if model.is_none() {
                    anyhow::bail!(
                        "{}.model must be specified when provider is '{}'",
                        section,
                        provider
                    );
                }
            }
            other => anyhow::bail!(
                "Unknown {} provider: '{}'. Must be disabled, openai, or ollama.",
                section,
                other
            ),
        }
    }

    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.metrics.yoy_policy, YoyPolicy::SameQuarter);
        assert!(!config.embedding.is_enabled());
        assert!(!config.llm.is_enabled());
        assert_eq!(config.server.bind, "0.0.0.0:8000");
        assert_eq!(config.server.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_full_file() {
        let config = parse_config(
            r#"
[chunking]
chunk_size = 400
chunk_overlap = 50

[retrieval]
query = "margins"
top_k = 3

[metrics]
yoy_policy = "legacy"
chart_window = 12

[narrative]
strong_growth_pct = 15.0

[embedding]
provider = "ollama"
model = "nomic-embed-text"
url = "http://localhost:11434"

[llm]
provider = "openai"
model = "gpt-4-turbo-preview"
temperature = 0.2

[server]
bind = "127.0.0.1:9000"
allowed_origins = []
"#,
        )
        .unwrap();

        let settings = config.pipeline_settings().unwrap();
        assert_eq!(settings.splitter.chunk_size(), 400);
        assert_eq!(settings.query, "margins");
        assert_eq!(settings.top_k, 3);
        assert_eq!(settings.metrics.yoy_policy, YoyPolicy::Legacy);
        assert_eq!(settings.metrics.chart_window, 12);
        assert_eq!(settings.thresholds.strong_growth_pct, 15.0);
        assert_eq!(settings.thresholds.favorable_market_pct, 5.0);
        assert_eq!(config.embedding.provider, "ollama");
        assert_eq!(config.llm.temperature, 0.2);
        assert!(config.server.allowed_origins.is_empty());
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            ("[chunking]\nchunk_size = 0", "chunk_size must be > 0"),
            ("[chunking]\nchunk_size = 100\nchunk_overlap = 50", "less than half"),
            ("[retrieval]\ntop_k = 0", "top_k must be >= 1"),
            ("[embedding]\nprovider = \"openai\"", "embedding.model must be specified"),
            ("[llm]\nprovider = \"gemini\"\nmodel = \"x\"", "Unknown llm provider"),
            ("[narrative]\nstrong_growth_pct = -1.0", "non-negative"),
        ];
        for (toml, expected) in cases {
            let err = parse_config(toml).unwrap_err().to_string();
            assert!(err.contains(expected), "{:?} gave {:?}", toml, err);
        }
    }

    #[test]
    fn test_example_file_matches_defaults() {
        let config = parse_config(include_str!("../config/mdna.example.toml")).unwrap();
        let settings = config.pipeline_settings().unwrap();
        assert_eq!(settings, PipelineSettings::default());
        assert_eq!(
            config.server.allowed_origins,
            ServerConfig::default().allowed_origins
        );
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = resolve_config(Some(Path::new("/nonexistent/mdna.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
