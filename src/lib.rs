//! # Dieah Recall
//!
//! Multi-tier conversational memory for Dieah agents.
//!
//! ## Architecture
//!
//! The memory layer has three tiers and a thin coordinator:
//! - **Bounded context** - per-conversation turns kept within a token budget
//!   by importance/recency-weighted eviction
//! - **Memory graph** - durable facts with parent/child links, bounded
//!   cycle-safe traversal and type/content search
//! - **Embedding index** - fixed-dimension vectors ranked by cosine similarity
//! - **Facade** - routes store/retrieve/update/delete across the tiers and
//!   merges retrieval results
//!
//! Graph and index persist a JSON snapshot after every mutation through a
//! [`storage::SnapshotStore`] (a JSON file or a SQLite row).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dieah_recall::{Config, MemoryFacade, RetrievalQuery, Role, StoreRequest};
//!
//! let memory = MemoryFacade::open(Config::default())?;
//! let conversation = memory.open_conversation("alice").await?;
//!
//! memory.store("alice", StoreRequest::Turn {
//!     conversation_id: conversation.clone(),
//!     role: Role::User,
//!     content: "I take my tea green".into(),
//!     token_count: None,
//! }).await?;
//!
//! let context = memory
//!     .retrieve("alice", RetrievalQuery::text("tea").for_conversation(&conversation))
//!     .await?;
//! println!("{}", context.format_for_prompt());
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod facade;
pub mod graph;
pub mod index;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod storage;
pub mod tokens;

/// Free-form metadata attached to nodes and embeddings
pub type Metadata = std::collections::HashMap<String, serde_json::Value>;

pub use config::{CompressionPolicy, Config, StorageBackend, TokenizerKind};
pub use context::{BoundedContext, CompressionReport, ContextState};
pub use error::{Error, Result};
pub use facade::{
    MemoryFacade, MemoryRef, Promoted, Promotion, RetrievalQuery, StoreRequest, Stored,
    Traversal, UpdateRequest,
};
pub use graph::{AddNodeOutcome, MemoryGraph, MemoryNode};
pub use index::{EmbeddingIndex, SearchHit};
pub use message::{ContextMessage, Role, Turn};
pub use provider::{Action, AllowAll, Authorizer, CompletionProvider, EmbeddingProvider};
pub use retrieval::{ContextBudget, RetrievalContext, RetrievedFact};
pub use tokens::TokenCounter;
