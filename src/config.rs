//! TOML configuration for the grader.
//!
//! Every section except `[corpus]` has defaults, so a minimal config only
//! names the rubric and question directories:
//!
//! ```toml
//! [corpus]
//! rubric_dir = "data/rubrics"
//! question_dir = "data/questions"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::grader::Scale;
use crate::models::Category;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub grading: GradingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub rubric_dir: PathBuf,
    pub question_dir: PathBuf,
    /// Optional; an empty path is treated as absent.
    #[serde(default)]
    pub solution_dir: Option<PathBuf>,
    #[serde(default)]
    pub exemplar_dir: Option<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl CorpusConfig {
    /// Configured roots in load order, skipping absent optional ones.
    pub fn roots(&self) -> Vec<(Category, &Path)> {
        let mut roots = vec![
            (Category::Rubric, self.rubric_dir.as_path()),
            (Category::Question, self.question_dir.as_path()),
        ];
        if let Some(dir) = &self.solution_dir {
            roots.push((Category::Solution, dir.as_path()));
        }
        if let Some(dir) = &self.exemplar_dir {
            roots.push((Category::Exemplar, dir.as_path()));
        }
        roots.retain(|(_, dir)| !dir.as_os_str().is_empty());
        roots
    }
}

fn default_include_globs() -> Vec<String> {
    ["**/*.txt", "**/*.md", "**/*.json", "**/*.pdf", "**/*.docx"]
        .iter()
        .map(|g| g.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    /// Record pages without extractable text as placeholder chunks.
    #[serde(default)]
    pub keep_empty_pages: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            min_chars: default_min_chars(),
            keep_empty_pages: false,
        }
    }
}

fn default_chunk_size() -> usize {
    1200
}
fn default_overlap() -> usize {
    200
}
fn default_min_chars() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_features")]
    pub max_features: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            max_features: default_max_features(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("data/index/tfidf_index.json")
}
fn default_max_features() -> usize {
    100_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k_rubric")]
    pub k_rubric: usize,
    #[serde(default = "default_k_question")]
    pub k_question: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k_rubric: default_k_rubric(),
            k_question: default_k_question(),
        }
    }
}

fn default_k_rubric() -> usize {
    4
}
fn default_k_question() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct OracleConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Name of the environment variable holding the bearer token.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_model() -> String {
    "llama3-70b-8192".to_string()
}
fn default_max_tokens() -> u32 {
    1200
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    2
}
fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct GradingConfig {
    #[serde(default)]
    pub scale: Scale,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }
    if config.index.max_features == 0 {
        bail!("index.max_features must be > 0");
    }
    if config.retrieval.k_rubric + config.retrieval.k_question == 0 {
        bail!("retrieval.k_rubric + retrieval.k_question must be >= 1");
    }
    if !(0.0..=2.0).contains(&config.oracle.temperature) {
        bail!("oracle.temperature must be in [0.0, 2.0]");
    }
    if config.oracle.timeout_secs == 0 {
        bail!("oracle.timeout_secs must be > 0");
    }
    if config.oracle.base_url.trim().is_empty() {
        bail!("oracle.base_url must not be empty");
    }
    Ok(())
}
