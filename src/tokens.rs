//! Token counting for context budgets

use std::sync::Arc;

use crate::config::TokenizerKind;
use crate::error::{Error, Result};

/// Token counter used when a turn arrives without an explicit count
#[derive(Clone)]
pub enum TokenCounter {
    /// ~4 characters per token, never zero
    Heuristic,
    /// BPE tokenizer from tiktoken
    Bpe(Arc<tiktoken_rs::CoreBPE>),
}

impl TokenCounter {
    /// The character-length estimate
    pub fn heuristic() -> Self {
        TokenCounter::Heuristic
    }

    /// Tokenizer for a specific model name known to tiktoken
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = tiktoken_rs::get_bpe_from_model(model).map_err(|e| {
            Error::tokenizer(format!("Failed to load tokenizer for {}: {}", model, e))
        })?;
        Ok(TokenCounter::Bpe(Arc::new(bpe)))
    }

    /// cl100k_base, shared by GPT-4 class models and close enough for Claude
    pub fn for_gpt() -> Result<Self> {
        Self::for_model("gpt-4")
    }

    /// Build the counter a config asks for
    pub fn from_kind(kind: TokenizerKind) -> Result<Self> {
        match kind {
            TokenizerKind::Heuristic => Ok(Self::heuristic()),
            TokenizerKind::Bpe => Self::for_gpt(),
        }
    }

    /// Count tokens in a text
    pub fn count(&self, text: &str) -> u32 {
        match self {
            TokenCounter::Heuristic => Self::estimate(text),
            TokenCounter::Bpe(bpe) => {
                u32::try_from(bpe.encode_with_special_tokens(text).len()).unwrap_or(u32::MAX)
            }
        }
    }

    /// Estimate tokens without a tokenizer
    pub fn estimate(text: &str) -> u32 {
        u32::try_from(text.len() / 4)
            .unwrap_or(u32::MAX)
            .saturating_add(1)
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::heuristic()
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenCounter::Heuristic => write!(f, "TokenCounter::Heuristic"),
            TokenCounter::Bpe(_) => write!(f, "TokenCounter::Bpe"),
        }
    }
}
