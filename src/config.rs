//! TOML configuration parsing and validation.
//!
//! Every section has serde defaults so tests and embedders can build a
//! [`PipelineConfig`] with `Default::default()` and override only what
//! they need.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PipelineError, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PipelineConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub memo: MemoConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory holding one index directory per document.
    #[serde(default = "default_index_root")]
    pub index_root: PathBuf,
    /// Path of the cache mirror file.
    #[serde(default = "default_cache_mirror")]
    pub cache_mirror: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            index_root: default_index_root(),
            cache_mirror: default_cache_mirror(),
        }
    }
}

fn default_index_root() -> PathBuf {
    PathBuf::from("vector_stores")
}
fn default_cache_mirror() -> PathBuf {
    PathBuf::from("cache_data.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters carried over from the tail of the previous chunk.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    4000
}
fn default_chunk_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Passages requested per document per query.
    #[serde(default = "default_search_k")]
    pub search_k: usize,
    /// Cap on merged passages for multi-document prompts.
    #[serde(default = "default_max_context_passages")]
    pub max_context_passages: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_k: default_search_k(),
            max_context_passages: default_max_context_passages(),
        }
    }
}

fn default_search_k() -> usize {
    2
}
fn default_max_context_passages() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embed_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// Faster model used for scope-less general chat.
    #[serde(default = "default_general_model")]
    pub general_model: String,
    /// Model used for retrieval-backed answers.
    #[serde(default = "default_document_model")]
    pub document_model: String,
    #[serde(default = "default_general_max_tokens")]
    pub general_max_tokens: u32,
    #[serde(default = "default_document_max_tokens")]
    pub document_max_tokens: u32,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            general_model: default_general_model(),
            document_model: default_document_model(),
            general_max_tokens: default_general_max_tokens(),
            document_max_tokens: default_document_max_tokens(),
            max_retries: default_generation_retries(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_general_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_document_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_general_max_tokens() -> u32 {
    1024
}
fn default_document_max_tokens() -> u32 {
    1500
}
fn default_generation_retries() -> u32 {
    2
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
    /// Time-to-live from insertion, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_max_entries(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_cache_max_entries() -> usize {
    100
}
fn default_cache_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    /// Exchanges retained per session (one exchange = question + answer).
    #[serde(default = "default_max_exchanges")]
    pub max_exchanges: usize,
    /// Exchanges included in the generation prompt.
    #[serde(default = "default_prompt_turns")]
    pub prompt_turns: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_exchanges: default_max_exchanges(),
            prompt_turns: default_prompt_turns(),
        }
    }
}

fn default_max_exchanges() -> usize {
    10
}
fn default_prompt_turns() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoConfig {
    /// Entry count that triggers a wholesale memoizer reset.
    #[serde(default = "default_memo_max_entries")]
    pub max_entries: usize,
}

impl Default for MemoConfig {
    fn default() -> Self {
        Self {
            max_entries: default_memo_max_entries(),
        }
    }
}

fn default_memo_max_entries() -> usize {
    100
}

pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::Configuration(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    let config: PipelineConfig = toml::from_str(&content)
        .map_err(|e| PipelineError::Configuration(format!("failed to parse config file: {}", e)))?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &PipelineConfig) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        return Err(PipelineError::Configuration(
            "chunking.chunk_size must be > 0".to_string(),
        ));
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        return Err(PipelineError::Configuration(
            "chunking.chunk_overlap must be smaller than chunking.chunk_size".to_string(),
        ));
    }
    if config.retrieval.search_k == 0 {
        return Err(PipelineError::Configuration(
            "retrieval.search_k must be >= 1".to_string(),
        ));
    }
    if config.retrieval.max_context_passages == 0 {
        return Err(PipelineError::Configuration(
            "retrieval.max_context_passages must be >= 1".to_string(),
        ));
    }
    if config.cache.max_entries == 0 {
        return Err(PipelineError::Configuration(
            "cache.max_entries must be >= 1".to_string(),
        ));
    }
    if config.memory.prompt_turns > config.memory.max_exchanges {
        return Err(PipelineError::Configuration(
            "memory.prompt_turns must not exceed memory.max_exchanges".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(validate(&config).is_ok());
        assert_eq!(config.chunking.chunk_size, 4000);
        assert_eq!(config.chunking.chunk_overlap, 100);
        assert_eq!(config.retrieval.search_k, 2);
        assert_eq!(config.cache.ttl_secs, 3600);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: PipelineConfig = toml::from_str("").unwrap();
        assert_eq!(config.retrieval.max_context_passages, 10);
        assert_eq!(config.generation.document_model, "gpt-4o-mini");
    }

    #[test]
    fn partial_toml_overrides_one_section() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [chunking]
            chunk_size = 500
            chunk_overlap = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.retrieval.search_k, 2);
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        let mut config = PipelineConfig::default();
        config.chunking.chunk_size = 100;
        config.chunking.chunk_overlap = 100;
        assert!(matches!(
            validate(&config),
            Err(PipelineError::Configuration(_))
        ));
    }
}
