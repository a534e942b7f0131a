//! Merged retrieval results and context budget tracking

use serde::Serialize;

use crate::graph::MemoryNode;
use crate::index::SearchHit;
use crate::message::ContextMessage;
use crate::tokens::TokenCounter;

/// How a fact ended up in a retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FactSource {
    /// Matched the query text
    ContentMatch,
    /// Matched the requested node type
    TypeMatch,
    /// Ancestor of the anchor node
    Ancestor,
    /// Descendant of the anchor node
    Descendant,
}

/// A graph node pulled into a retrieval
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedFact {
    pub id: String,
    pub node_type: String,
    pub content: String,
    /// Match density for content matches, 0.0 otherwise
    pub score: f64,
    pub source: FactSource,
}

impl RetrievedFact {
    pub fn from_node(node: &MemoryNode, score: f64, source: FactSource) -> Self {
        Self {
            id: node.id.clone(),
            node_type: node.node_type.clone(),
            content: node.content.clone(),
            score,
            source,
        }
    }
}

/// Retrieved context ready for injection into prompts
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalContext {
    /// Recent conversation turns, chronological
    pub recent: Vec<ContextMessage>,

    /// Structurally related facts from the memory graph
    pub facts: Vec<RetrievedFact>,

    /// Semantically similar entries from the embedding index
    pub semantic: Vec<SearchHit>,

    /// Estimated tokens in this context
    pub total_tokens: u64,
}

impl RetrievalContext {
    /// Create an empty context
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check if context is empty
    pub fn is_empty(&self) -> bool {
        self.recent.is_empty() && self.facts.is_empty() && self.semantic.is_empty()
    }

    /// Add a fact unless a fact with the same id is already present
    pub fn push_fact(&mut self, fact: RetrievedFact) -> bool {
        if self.facts.iter().any(|existing| existing.id == fact.id) {
            return false;
        }
        self.facts.push(fact);
        true
    }

    /// Recompute `total_tokens` from the rendered parts
    pub fn estimate_tokens(&mut self) {
        let recent: u64 = self
            .recent
            .iter()
            .map(|m| u64::from(TokenCounter::estimate(&m.content)))
            .sum();
        let facts: u64 = self
            .facts
            .iter()
            .map(|f| u64::from(TokenCounter::estimate(&f.content)))
            .sum();
        let semantic: u64 = self
            .semantic
            .iter()
            .map(|hit| u64::from(TokenCounter::estimate(&semantic_text(hit))))
            .sum();
        self.total_tokens = recent + facts + semantic;
    }

    /// Format the context for injection into a prompt
    pub fn format_for_prompt(&self) -> String {
        let mut parts = Vec::new();

        if !self.facts.is_empty() {
            parts.push("## Known Facts\n".to_string());
            for fact in &self.facts {
                parts.push(format!("- [{}] {}\n", fact.node_type, fact.content));
            }
        }

        if !self.semantic.is_empty() {
            if !parts.is_empty() {
                parts.push("\n".to_string());
            }
            parts.push("## Related Memories\n".to_string());
            for hit in &self.semantic {
                parts.push(format!("- ({:.2}) {}\n", hit.score, semantic_text(hit)));
            }
        }

        if !self.recent.is_empty() {
            if !parts.is_empty() {
                parts.push("\n".to_string());
            }
            parts.push("## Recent Conversation Context\n".to_string());
            for msg in &self.recent {
                parts.push(format!("{}: {}\n", msg.role, msg.content));
            }
        }

        parts.join("")
    }
}

/// The `content` metadata field of a hit, or its id
fn semantic_text(hit: &SearchHit) -> String {
    hit.metadata
        .get("content")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| hit.id.clone())
}

/// A conversation's token total measured against its limit
///
/// `status` reports `ok`, `warning` or `critical` once utilization crosses
/// the configured thresholds.
#[derive(Debug, Clone, Serialize)]
pub struct ContextBudget {
    pub limit: u32,
    pub used: u64,
    pub warning_threshold: f32,
    pub critical_threshold: f32,
}

impl ContextBudget {
    pub fn new(limit: u32, warning_threshold: f32, critical_threshold: f32) -> Self {
        Self {
            limit,
            used: 0,
            warning_threshold,
            critical_threshold,
        }
    }

    /// Count `tokens` against the limit
    pub fn add(&mut self, tokens: u64) {
        self.used = self.used.saturating_add(tokens);
    }

    /// Fraction of the limit in use; above 1.0 when over budget
    pub fn utilization(&self) -> f32 {
        if self.limit == 0 {
            return 0.0;
        }
        (self.used as f64 / f64::from(self.limit)) as f32
    }

    pub fn is_warning(&self) -> bool {
        self.utilization() >= self.warning_threshold
    }

    pub fn is_critical(&self) -> bool {
        self.utilization() >= self.critical_threshold
    }

    /// Tokens left before the limit, zero once it is reached
    pub fn remaining(&self) -> u64 {
        u64::from(self.limit).saturating_sub(self.used)
    }

    pub fn status(&self) -> &'static str {
        match (self.is_critical(), self.is_warning()) {
            (true, _) => "critical",
            (false, true) => "warning",
            _ => "ok",
        }
    }
}
