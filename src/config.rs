//! TOML configuration parsing and validation.
//!
//! Every tunable of the pipeline lives here: corpus location, chunk budgets,
//! embedding and completion providers, and the grading policy (batch size,
//! grounding truncation, rubric). [`load_config`] rejects invalid
//! combinations up front so the pipeline never starts half-configured.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub citations: CitationConfig,
    #[serde(default)]
    pub grading: GradingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            min_chars: default_min_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    800
}
fn default_min_chars() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_embed_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            batch_size: default_embed_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_embed_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Characters of each hit passed to grounded generation.
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            context_chars: default_context_chars(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_context_chars() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_llm_model(),
            base_url: default_base_url(),
            max_retries: default_llm_retries(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_retries() -> u32 {
    2
}
fn default_llm_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct CitationConfig {
    /// Trimmed texts shorter than this never reach the model.
    #[serde(default = "default_citation_min_chars")]
    pub min_chars: usize,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_citation_max_tokens")]
    pub max_tokens: u32,
}

impl Default for CitationConfig {
    fn default() -> Self {
        Self {
            min_chars: default_citation_min_chars(),
            temperature: 0.0,
            max_tokens: default_citation_max_tokens(),
        }
    }
}

fn default_citation_min_chars() -> usize {
    10
}
fn default_citation_max_tokens() -> u32 {
    350
}

#[derive(Debug, Deserialize, Clone)]
pub struct GradingConfig {
    #[serde(default = "default_grading_batch_size")]
    pub batch_size: usize,
    /// Grounding excerpts are cut (not summarized) to this many characters.
    #[serde(default = "default_grounding_chars")]
    pub grounding_chars: usize,
    #[serde(default = "default_max_score")]
    pub max_score: u32,
    #[serde(default = "default_grading_temperature")]
    pub temperature: f32,
    #[serde(default = "default_grading_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_rubric")]
    pub rubric: String,
    /// Question prompts keyed by question number (`"1"`, `"2"`, ...).
    #[serde(default)]
    pub questions: HashMap<String, String>,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_grading_batch_size(),
            grounding_chars: default_grounding_chars(),
            max_score: default_max_score(),
            temperature: default_grading_temperature(),
            max_tokens: default_grading_max_tokens(),
            rubric: default_rubric(),
            questions: HashMap::new(),
        }
    }
}

fn default_grading_batch_size() -> usize {
    10
}
fn default_grounding_chars() -> usize {
    4000
}
fn default_max_score() -> u32 {
    5
}
fn default_grading_temperature() -> f32 {
    0.3
}
fn default_grading_max_tokens() -> u32 {
    2000
}

pub const DEFAULT_RUBRIC: &str = "\
GRADING RUBRIC (per risk/mitigation):
- 0 points: no text entered for the answer
- 2 points: factually incorrect, or the citation is irrelevant
- 3 points: overall idea is correct, but the citation is wrong, missing or not specific
- 4 points: answer is only 1-2 sentences
- 5 points: answer is 3+ sentences with a specific, accurate citation
A citation to a book chapter must include a subheading, page number or direct quote;
a bare chapter title is not specific enough.

AI USAGE DEDUCTION (from the AI Usage Statement, applied after the base score, never below 0):
- -1 point: explained AI usage but did not give the exact prompt used
- -2 points: only stated that AI was used without explaining how, or did not state whether AI was used
- no deduction: stated that no AI was used, or explained the usage including the exact prompt";

fn default_rubric() -> String {
    DEFAULT_RUBRIC.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_temperature")]
    pub temperature: f32,
    #[serde(default = "default_generation_max_tokens")]
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_generation_temperature(),
            max_tokens: default_generation_max_tokens(),
        }
    }
}

fn default_generation_temperature() -> f32 {
    0.7
}
fn default_generation_max_tokens() -> u32 {
    500
}

impl GradingConfig {
    pub fn question_prompt(&self, question: u32) -> &str {
        self.questions
            .get(&question.to_string())
            .map(String::as_str)
            .unwrap_or("")
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.max_chars == 0 {
        bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.min_chars > config.chunking.max_chars {
        bail!("chunking.min_chars must not exceed chunking.max_chars");
    }

    // Retrieval
    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }

    // Grading
    if config.grading.batch_size == 0 {
        bail!("grading.batch_size must be >= 1");
    }
    if config.grading.grounding_chars == 0 {
        bail!("grading.grounding_chars must be > 0");
    }

    // Embedding
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be >= 1");
    }
    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" => {
            if config.embedding.model.is_none() {
                bail!("embedding.model must be specified when provider is 'openai'");
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!("embedding.dims must be > 0 when provider is 'openai'");
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or local.",
            other
        ),
    }

    match config.llm.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(())
}
