//! TOML configuration.
//!
//! Every section except `[db]` and `[server]` has defaults, so a minimal
//! file only needs a database path and a bind address. Secrets are never
//! read from the file: `[llm]`, `[embedding]` and `[tts]` name the
//! environment variables that hold them.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub cost: CostConfig,
}

/// Upper bound on any search result count, configured or requested.
pub const MAX_SEARCH_LIMIT: usize = 100;

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    /// Allowed CORS origins. Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_api_prefix() -> String {
    "/api/v1".to_string()
}
fn default_static_dir() -> PathBuf {
    PathBuf::from("./static")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            api_key_env: default_llm_key_env(),
            timeout_secs: None,
        }
    }
}

fn default_llm_endpoint() -> String {
    "https://router.huggingface.co/v1/chat/completions".to_string()
}
fn default_llm_model() -> String {
    "Qwen/Qwen2.5-7B-Instruct".to_string()
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_temperature() -> f32 {
    0.7
}
fn default_llm_key_env() -> String {
    "HF_API_TOKEN".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    #[serde(default = "default_vector_backend")]
    pub backend: String,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: default_vector_backend(),
            collection: default_collection(),
        }
    }
}

fn default_vector_backend() -> String {
    "sqlite".to_string()
}
fn default_collection() -> String {
    "manifestations".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Prior passages folded into each generation prompt.
    #[serde(default = "default_context_k")]
    pub context_k: usize,
    #[serde(default = "default_context_preview_chars")]
    pub context_preview_chars: usize,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    /// Length of the `preview` field in search and history responses.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            context_k: default_context_k(),
            context_preview_chars: default_context_preview_chars(),
            search_limit: default_search_limit(),
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_context_k() -> usize {
    2
}
fn default_context_preview_chars() -> usize {
    300
}
fn default_search_limit() -> usize {
    10
}
fn default_preview_chars() -> usize {
    150
}

#[derive(Debug, Deserialize, Clone)]
pub struct TtsConfig {
    #[serde(default = "default_tts_provider")]
    pub provider: String,
    #[serde(default = "default_tts_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_tts_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    #[serde(default = "default_rate")]
    pub rate: String,
    #[serde(default = "default_pitch")]
    pub pitch: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: default_tts_provider(),
            endpoint: default_tts_endpoint(),
            api_key_env: default_tts_key_env(),
            output_format: default_output_format(),
            rate: default_rate(),
            pitch: default_pitch(),
        }
    }
}

fn default_tts_provider() -> String {
    "disabled".to_string()
}
fn default_tts_endpoint() -> String {
    "https://eastus.tts.speech.microsoft.com/cognitiveservices/v1".to_string()
}
fn default_tts_key_env() -> String {
    "AZURE_SPEECH_KEY".to_string()
}
fn default_output_format() -> String {
    "audio-24khz-48kbitrate-mono-mp3".to_string()
}
fn default_rate() -> String {
    "-5%".to_string()
}
fn default_pitch() -> String {
    "+0Hz".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CostConfig {
    #[serde(default = "default_tokens_per_word")]
    pub tokens_per_word: f64,
    #[serde(default = "default_cost_per_1k")]
    pub cost_per_1k_tokens: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            tokens_per_word: default_tokens_per_word(),
            cost_per_1k_tokens: default_cost_per_1k(),
        }
    }
}

fn default_tokens_per_word() -> f64 {
    1.3
}
fn default_cost_per_1k() -> f64 {
    0.0005
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate server
    let prefix = &config.server.api_prefix;
    if !prefix.is_empty() && !prefix.starts_with('/') {
        anyhow::bail!("server.api_prefix must be empty or start with '/', got '{}'", prefix);
    }

    // Validate llm
    if config.llm.max_tokens == 0 {
        anyhow::bail!("llm.max_tokens must be > 0");
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }

    // Validate retrieval
    if config.retrieval.context_k < 1 {
        anyhow::bail!("retrieval.context_k must be >= 1");
    }
    if !(1..=MAX_SEARCH_LIMIT).contains(&config.retrieval.search_limit) {
        anyhow::bail!("retrieval.search_limit must be in 1..={}", MAX_SEARCH_LIMIT);
    }

    // Validate cost
    if config.cost.tokens_per_word <= 0.0 {
        anyhow::bail!("cost.tokens_per_word must be > 0");
    }
    if config.cost.cost_per_1k_tokens < 0.0 {
        anyhow::bail!("cost.cost_per_1k_tokens must be >= 0");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    match config.vector.backend.as_str() {
        "sqlite" | "memory" => {}
        other => anyhow::bail!(
            "Unknown vector backend: '{}'. Must be sqlite or memory.",
            other
        ),
    }

    match config.tts.provider.as_str() {
        "disabled" | "azure" => {}
        other => anyhow::bail!(
            "Unknown tts provider: '{}'. Must be disabled or azure.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/envision.sqlite"

[server]
bind = "127.0.0.1:8000"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.server.api_prefix, "/api/v1");
        assert_eq!(cfg.llm.model, "Qwen/Qwen2.5-7B-Instruct");
        assert_eq!(cfg.llm.max_tokens, 2000);
        assert_eq!(cfg.retrieval.context_k, 2);
        assert_eq!(cfg.vector.collection, "manifestations");
        assert!(!cfg.embedding.is_enabled());
        assert!((cfg.cost.tokens_per_word - 1.3).abs() < 1e-9);
    }

    #[test]
    fn test_openai_requires_dims() {
        let content = format!("{}\n[embedding]\nprovider = \"openai\"\nmodel = \"m\"\n", MINIMAL);
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_local_provider_needs_no_dims() {
        let content = format!("{}\n[embedding]\nprovider = \"local\"\n", MINIMAL);
        assert!(parse_config(&content).is_ok());
    }

    #[test]
    fn test_unknown_vector_backend() {
        let content = format!("{}\n[vector]\nbackend = \"qdrant\"\n", MINIMAL);
        assert!(parse_config(&content).is_err());
    }

    #[test]
    fn test_zero_context_k_rejected() {
        let content = format!("{}\n[retrieval]\ncontext_k = 0\n", MINIMAL);
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("context_k"));
    }

    #[test]
    fn test_api_prefix_needs_leading_slash() {
        let content = MINIMAL.replace(
            "bind = \"127.0.0.1:8000\"",
            "bind = \"127.0.0.1:8000\"\napi_prefix = \"api/v1\"",
        );
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("api_prefix"));

        let content = MINIMAL.replace(
            "bind = \"127.0.0.1:8000\"",
            "bind = \"127.0.0.1:8000\"\napi_prefix = \"\"",
        );
        assert_eq!(parse_config(&content).unwrap().server.api_prefix, "");
    }

    #[test]
    fn test_search_limit_upper_bound() {
        let content = format!("{}\n[retrieval]\nsearch_limit = 500\n", MINIMAL);
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("search_limit"));

        let content = format!("{}\n[retrieval]\nsearch_limit = 100\n", MINIMAL);
        assert_eq!(parse_config(&content).unwrap().retrieval.search_limit, 100);
    }
}
