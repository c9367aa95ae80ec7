//! TOML configuration.
//!
//! Every tunable of the pipeline lives here and is injected once: the
//! chunking parameters, the embedding model, and the completion model are
//! shared by every collection build, every question, and code generation.
//!
//! All sections are optional. A missing section (or a missing config file)
//! falls back to the defaults below.
//!
//! ```toml
//! [cache]
//! dir = "./cache"
//!
//! [github]
//! token_env = "GITHUB_TOKEN"
//! max_file_size = 1000000
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [retrieval]
//! top_k = 5
//! history_turns = 2
//!
//! [embedding]
//! provider = "local"
//! model = "all-minilm-l6-v2"
//!
//! [llm]
//! provider = "openai"
//! url = "https://api.groq.com/openai/v1"
//! model = "openai/gpt-oss-120b"
//! api_key_env = "GROQ_API_KEY"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

impl CacheConfig {
    /// Path of the SQLite file holding every cached collection.
    pub fn db_path(&self) -> PathBuf {
        self.dir.join("collections.sqlite")
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitHubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_raw_url")]
    pub raw_url: String,
    /// Environment variable holding the personal access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Per-file byte cap, applied to both GitHub and uploaded files.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_skip_dirs")]
    pub skip_dirs: Vec<String>,
    /// Extension-less file stems that are always loaded (case-insensitive).
    #[serde(default = "default_special_files")]
    pub special_files: Vec<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            raw_url: default_raw_url(),
            token_env: default_token_env(),
            max_file_size: default_max_file_size(),
            extensions: default_extensions(),
            skip_dirs: default_skip_dirs(),
            special_files: default_special_files(),
        }
    }
}

impl GitHubConfig {
    /// Read the access token from the configured environment variable.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_raw_url() -> String {
    "https://raw.githubusercontent.com".to_string()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_max_file_size() -> u64 {
    1_000_000
}
fn default_extensions() -> Vec<String> {
    [
        ".py", ".js", ".ts", ".jsx", ".tsx", ".java", ".cpp", ".c", ".h", ".cs", ".php", ".rb",
        ".go", ".rs", ".scala", ".kt", ".sol", ".r", ".sh", ".ipynb", ".md", ".rst", ".txt",
        ".adoc", ".json", ".yaml", ".yml", ".toml", ".ini", ".cfg", ".conf", ".html", ".css",
        ".scss", ".less",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_skip_dirs() -> Vec<String> {
    [
        "node_modules",
        ".git",
        "__pycache__",
        ".pytest_cache",
        "venv",
        ".venv",
        "env",
        ".env",
        "dist",
        "build",
        ".next",
        ".nuxt",
        "coverage",
        ".coverage",
        "logs",
        ".idea",
        ".vscode",
        "target",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_special_files() -> Vec<String> {
    [
        "README",
        "LICENSE",
        "CHANGELOG",
        "CONTRIBUTING",
        "DOCKERFILE",
        "MAKEFILE",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Target chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between neighbouring chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Split each file on its own (with a language-aware splitter) instead
    /// of splitting the concatenated text as a single source.
    #[serde(default = "default_per_file")]
    pub per_file: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            per_file: default_per_file(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_per_file() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Prior question/answer pairs prepended to a new question.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            history_turns: default_history_turns(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_history_turns() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the `openai` and `ollama` providers.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            api_key_env: default_embedding_key_env(),
            batch_size: default_batch_size(),
            max_retries: 0,
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_embedding_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `openai` (any OpenAI-compatible chat endpoint, Groq by default) or `ollama`.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_url")]
    pub url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            url: default_llm_url(),
            model: default_llm_model(),
            api_key_env: default_llm_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_llm_model() -> String {
    "openai/gpt-oss-120b".to_string()
}
fn default_llm_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_llm_timeout() -> u64 {
    120
}

/// Load and validate a config file.
///
/// A missing file is not an error: the built-in defaults are used so the
/// tool works out of the box with only `GITHUB_TOKEN` and `GROQ_API_KEY`
/// exported.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    validate(&config)?;
    Ok(config)
}

/// Check cross-field constraints that serde cannot express.
pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    match config.embedding.provider.as_str() {
        "local" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be local, openai, or ollama.",
            other
        ),
    }
    if config.embedding.provider != "local" && config.embedding.model.is_none() {
        bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }

    match config.llm.provider.as_str() {
        "openai" | "ollama" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be openai or ollama.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        bail!("llm.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}
