//! Configuration for dieah-recall

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Where component snapshots are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One JSON document per component in `data_dir`
    Json,
    /// One row per component in `data_dir/snapshots.db`
    Sqlite,
}

/// Which token counting strategy to use when a turn has no explicit count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerKind {
    /// `len / 4 + 1`
    Heuristic,
    /// cl100k_base BPE via tiktoken
    Bpe,
}

/// Eviction and prioritisation constants for bounded contexts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionPolicy {
    /// Fraction of `max_tokens` to compress down to
    #[serde(default = "default_target_ratio")]
    pub target_ratio: f64,

    /// Weight of recency in the eviction score; importance base gets the rest
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,

    /// Compression never leaves fewer turns than this
    #[serde(default = "default_min_retained")]
    pub min_retained: usize,

    /// Leading turns that are never evicted (system prompt)
    #[serde(default = "default_protected_head")]
    pub protected_head: usize,

    /// Trailing turns that are never evicted (latest exchange)
    #[serde(default = "default_protected_tail")]
    pub protected_tail: usize,

    #[serde(default = "default_min_importance")]
    pub min_importance: f64,

    #[serde(default = "default_max_importance")]
    pub max_importance: f64,

    #[serde(default = "default_importance")]
    pub default_importance: f64,
}

fn default_target_ratio() -> f64 {
    0.8
}

fn default_recency_weight() -> f64 {
    0.7
}

fn default_min_retained() -> usize {
    4
}

fn default_protected_head() -> usize {
    1
}

fn default_protected_tail() -> usize {
    2
}

fn default_min_importance() -> f64 {
    0.0
}

fn default_max_importance() -> f64 {
    2.0
}

fn default_importance() -> f64 {
    1.0
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self {
            target_ratio: default_target_ratio(),
            recency_weight: default_recency_weight(),
            min_retained: default_min_retained(),
            protected_head: default_protected_head(),
            protected_tail: default_protected_tail(),
            min_importance: default_min_importance(),
            max_importance: default_max_importance(),
            default_importance: default_importance(),
        }
    }
}

impl CompressionPolicy {
    /// Base weight applied regardless of recency
    pub fn base_weight(&self) -> f64 {
        1.0 - self.recency_weight
    }

    /// Clamp an importance value into the configured range
    pub fn clamp_importance(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.default_importance;
        }
        value.clamp(self.min_importance, self.max_importance)
    }

    /// Reject values that would make eviction meaningless
    pub fn validate(&self) -> Result<()> {
        if !(self.target_ratio > 0.0 && self.target_ratio <= 1.0) {
            return Err(Error::config(format!(
                "target_ratio must be in (0, 1], got {}",
                self.target_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.recency_weight) {
            return Err(Error::config(format!(
                "recency_weight must be in [0, 1], got {}",
                self.recency_weight
            )));
        }
        if self.min_importance > self.max_importance {
            return Err(Error::config("min_importance exceeds max_importance"));
        }
        if !(self.min_importance..=self.max_importance).contains(&self.default_importance) {
            return Err(Error::config(
                "default_importance must lie within the importance range",
            ));
        }
        Ok(())
    }
}

/// Configuration for the memory layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base directory for all snapshots
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_storage_backend")]
    pub storage_backend: StorageBackend,

    /// Embedding dimensions (384 for all-MiniLM-L6-v2)
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,

    /// Token budget of a conversation context
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: u32,

    /// Maximum number of results per retrieval source
    #[serde(default = "default_max_retrieval_results")]
    pub max_retrieval_results: usize,

    /// Depth used for ancestor/descendant expansion during retrieval
    #[serde(default = "default_traversal_depth")]
    pub default_traversal_depth: usize,

    #[serde(default = "default_tokenizer")]
    pub tokenizer: TokenizerKind,

    #[serde(default)]
    pub compression: CompressionPolicy,

    /// Context window warning threshold (0.0 - 1.0)
    #[serde(default = "default_warning_threshold")]
    pub context_warning_threshold: f32,

    /// Context window critical threshold (0.0 - 1.0)
    #[serde(default = "default_critical_threshold")]
    pub context_critical_threshold: f32,

    /// HTTP server port
    #[serde(default = "default_server_port")]
    pub server_port: u16,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dieah-recall")
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Json
}

fn default_embedding_dimensions() -> usize {
    384 // MiniLM-L6-v2 outputs 384-dim vectors
}

fn default_max_context_tokens() -> u32 {
    8000
}

fn default_max_retrieval_results() -> usize {
    10
}

fn default_traversal_depth() -> usize {
    3
}

fn default_tokenizer() -> TokenizerKind {
    TokenizerKind::Heuristic
}

fn default_warning_threshold() -> f32 {
    0.8
}

fn default_critical_threshold() -> f32 {
    0.95
}

fn default_server_port() -> u16 {
    8420
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            storage_backend: default_storage_backend(),
            embedding_dimensions: default_embedding_dimensions(),
            max_context_tokens: default_max_context_tokens(),
            max_retrieval_results: default_max_retrieval_results(),
            default_traversal_depth: default_traversal_depth(),
            tokenizer: default_tokenizer(),
            compression: CompressionPolicy::default(),
            context_warning_threshold: default_warning_threshold(),
            context_critical_threshold: default_critical_threshold(),
            server_port: default_server_port(),
        }
    }
}

impl Config {
    /// Create a new config with a custom data directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Load a config from a JSON file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedding_dimensions == 0 {
            return Err(Error::config("embedding_dimensions must be positive"));
        }
        if self.max_context_tokens == 0 {
            return Err(Error::config("max_context_tokens must be positive"));
        }
        if self.context_warning_threshold > self.context_critical_threshold {
            return Err(Error::config(
                "context_warning_threshold exceeds context_critical_threshold",
            ));
        }
        self.compression.validate()
    }

    /// Get the path to the memory graph snapshot
    pub fn graph_snapshot_path(&self) -> PathBuf {
        self.data_dir.join("graph.json")
    }

    /// Get the path to the embedding index snapshot
    pub fn index_snapshot_path(&self) -> PathBuf {
        self.data_dir.join("embeddings.json")
    }

    /// Get the path to the SQLite snapshot database
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("snapshots.db")
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }
}
