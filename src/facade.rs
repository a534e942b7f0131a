//! Coordination layer over the context, graph and index tiers
//!
//! Ad-hoc turns go to a per-conversation [`BoundedContext`], durable facts to
//! the [`MemoryGraph`], semantic content to the [`EmbeddingIndex`].
//! Retrieval consults all three and merges the results.
//!
//! Each tier sits behind its own `tokio::sync::Mutex`; conversations are
//! sharded so distinct conversations never contend. No operation holds two
//! tier locks at once.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Config, StorageBackend};
use crate::context::{BoundedContext, CompressionReport};
use crate::error::{Error, Result};
use crate::graph::{AddNodeOutcome, MemoryGraph, MemoryNode};
use crate::index::{EmbeddingIndex, SearchHit};
use crate::message::{ContextMessage, Role};
use crate::provider::{Action, AllowAll, Authorizer, CompletionProvider, EmbeddingProvider};
use crate::retrieval::{ContextBudget, FactSource, RetrievalContext, RetrievedFact};
use crate::storage::{JsonFileStore, SnapshotStore, SqliteStore};
use crate::tokens::TokenCounter;
use crate::Metadata;

const GRAPH_RESOURCE: &str = "graph";
const INDEX_RESOURCE: &str = "index";
const RETRIEVAL_RESOURCE: &str = "retrieval";

/// Something to remember
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreRequest {
    /// A conversation turn for bounded context
    Turn {
        conversation_id: String,
        role: Role,
        content: String,
        #[serde(default)]
        token_count: Option<u32>,
    },
    /// A durable fact for the memory graph
    Fact {
        content: String,
        node_type: String,
        #[serde(default)]
        parent_ids: Vec<String>,
        #[serde(default)]
        metadata: Metadata,
    },
    /// Free text for semantic recall; embedded by the configured provider
    /// when no vector is supplied
    Semantic {
        content: String,
        #[serde(default)]
        embedding: Option<Vec<f32>>,
        #[serde(default)]
        metadata: Metadata,
        #[serde(default)]
        id: Option<String>,
    },
}

/// Where a [`StoreRequest`] ended up
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stored {
    Turn {
        conversation_id: String,
        turn_count: usize,
        total_tokens: u64,
        compression: Option<CompressionReport>,
    },
    Fact(AddNodeOutcome),
    Semantic {
        id: String,
    },
}

/// What to pull into a retrieval
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrievalQuery {
    /// Conversation supplying recent turns
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Token cap for the recent slice; the whole conversation when absent
    #[serde(default)]
    pub max_recent_tokens: Option<u32>,
    /// Text for graph content search and, through the embedder, semantic search
    #[serde(default)]
    pub text: Option<String>,
    /// Restrict structural results to this node type
    #[serde(default)]
    pub node_type: Option<String>,
    /// Expand ancestors and descendants of this node
    #[serde(default)]
    pub anchor_id: Option<String>,
    #[serde(default)]
    pub traversal_depth: Option<usize>,
    /// Precomputed query vector; takes precedence over embedding `text`
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    /// Per-source result cap
    #[serde(default)]
    pub limit: Option<usize>,
}

impl RetrievalQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn for_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_anchor(mut self, anchor_id: impl Into<String>, depth: usize) -> Self {
        self.anchor_id = Some(anchor_id.into());
        self.traversal_depth = Some(depth);
        self
    }
}

/// A change to something already remembered
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpdateRequest {
    Fact {
        id: String,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        metadata: Option<Metadata>,
    },
    Importance {
        conversation_id: String,
        turn_index: usize,
        importance: f64,
    },
}

/// Something to forget
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemoryRef {
    Fact {
        id: String,
        #[serde(default)]
        recursive: bool,
    },
    Semantic {
        id: String,
    },
    Conversation {
        id: String,
    },
}

/// How to promote a turn out of bounded context
#[derive(Debug, Clone, Deserialize)]
pub struct Promotion {
    #[serde(default = "default_promotion_type")]
    pub node_type: String,
    #[serde(default)]
    pub parent_ids: Vec<String>,
    /// Vector for the index copy; the embedder is asked when absent
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

fn default_promotion_type() -> String {
    "fact".to_string()
}

impl Default for Promotion {
    fn default() -> Self {
        Self {
            node_type: default_promotion_type(),
            parent_ids: Vec::new(),
            embedding: None,
        }
    }
}

/// Result of promoting a turn
#[derive(Debug, Clone, Serialize)]
pub struct Promoted {
    pub node: AddNodeOutcome,
    /// Index entry id, if the turn was also embedded
    pub embedding_id: Option<String>,
}

/// Traversal direction for [`MemoryFacade::traverse`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Traversal {
    Parents,
    Children,
    Ancestors,
    Descendants,
}

type Conversation = Arc<Mutex<BoundedContext>>;

/// Multi-tier memory for one agent deployment
pub struct MemoryFacade {
    config: Config,
    counter: TokenCounter,
    graph: Mutex<MemoryGraph>,
    index: Mutex<EmbeddingIndex>,
    conversations: RwLock<HashMap<String, Conversation>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    completer: Option<Arc<dyn CompletionProvider>>,
    authorizer: Arc<dyn Authorizer>,
}

impl MemoryFacade {
    /// Open the memory layer with snapshots under `config.data_dir`
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        config.ensure_dirs()?;

        let (graph_store, index_store): (Box<dyn SnapshotStore>, Box<dyn SnapshotStore>) =
            match config.storage_backend {
                StorageBackend::Json => (
                    Box::new(JsonFileStore::new(config.graph_snapshot_path())?),
                    Box::new(JsonFileStore::new(config.index_snapshot_path())?),
                ),
                StorageBackend::Sqlite => {
                    let graph = SqliteStore::open(config.sqlite_path(), "graph")?;
                    let index = graph.sibling("embeddings");
                    (Box::new(graph), Box::new(index))
                }
            };

        info!(
            graph = %graph_store.describe(),
            index = %index_store.describe(),
            "Opening memory layer"
        );

        let graph = MemoryGraph::open(graph_store);
        let index = EmbeddingIndex::open(config.embedding_dimensions, index_store);
        Self::assemble(config, graph, index)
    }

    /// Memory layer that lives only as long as the process
    pub fn in_memory(config: Config) -> Result<Self> {
        config.validate()?;
        let index = EmbeddingIndex::new(config.embedding_dimensions);
        Self::assemble(config, MemoryGraph::new(), index)
    }

    fn assemble(config: Config, graph: MemoryGraph, index: EmbeddingIndex) -> Result<Self> {
        let counter = TokenCounter::from_kind(config.tokenizer)?;
        Ok(Self {
            config,
            counter,
            graph: Mutex::new(graph),
            index: Mutex::new(index),
            conversations: RwLock::new(HashMap::new()),
            embedder: None,
            completer: None,
            authorizer: Arc::new(AllowAll),
        })
    }

    /// Embed semantic content that arrives without a vector
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        if embedder.dimensions() != self.config.embedding_dimensions {
            return Err(Error::dimension_mismatch(
                self.config.embedding_dimensions,
                embedder.dimensions(),
            ));
        }
        self.embedder = Some(embedder);
        Ok(self)
    }

    /// Summarize conversations with a completion model
    pub fn with_completer(mut self, completer: Arc<dyn CompletionProvider>) -> Self {
        self.completer = Some(completer);
        self
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn token_counter(&self) -> &TokenCounter {
        &self.counter
    }

    async fn authorize(&self, subject: &str, resource: &str, action: Action) -> Result<()> {
        if self.authorizer.is_authorized(subject, resource, action).await {
            Ok(())
        } else {
            warn!(subject, resource, %action, "Access denied");
            Err(Error::unauthorized(subject, resource, action))
        }
    }

    // === Conversations ===

    /// Start a conversation with a fresh id
    pub async fn open_conversation(&self, subject: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.authorize(subject, &conversation_resource(&id), Action::Write)
            .await?;

        let context = BoundedContext::with_policy(
            self.config.max_context_tokens,
            self.config.compression.clone(),
        )
        .with_counter(self.counter.clone());

        self.conversations
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(context)));
        info!(conversation_id = %id, "Opened conversation");
        Ok(id)
    }

    pub async fn list_conversations(&self, subject: &str) -> Result<Vec<String>> {
        self.authorize(subject, "conversations", Action::Read).await?;
        let mut ids: Vec<String> = self.conversations.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn conversation(&self, id: &str) -> Result<Conversation> {
        self.conversations
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Conversation not found: {}", id)))
    }

    /// Turns of a conversation, prioritised down to `max_tokens` if given
    pub async fn conversation_slice(
        &self,
        subject: &str,
        conversation_id: &str,
        max_tokens: Option<u32>,
    ) -> Result<Vec<ContextMessage>> {
        self.authorize(subject, &conversation_resource(conversation_id), Action::Read)
            .await?;
        let conversation = self.conversation(conversation_id).await?;
        let context = conversation.lock().await;
        Ok(context.get(max_tokens))
    }

    pub async fn conversation_budget(
        &self,
        subject: &str,
        conversation_id: &str,
    ) -> Result<ContextBudget> {
        self.authorize(subject, &conversation_resource(conversation_id), Action::Read)
            .await?;
        let conversation = self.conversation(conversation_id).await?;
        let context = conversation.lock().await;
        Ok(context.budget(
            self.config.context_warning_threshold,
            self.config.context_critical_threshold,
        ))
    }

    /// Drop every turn but keep the conversation open
    pub async fn clear_conversation(&self, subject: &str, conversation_id: &str) -> Result<()> {
        self.authorize(subject, &conversation_resource(conversation_id), Action::Delete)
            .await?;
        let conversation = self.conversation(conversation_id).await?;
        conversation.lock().await.clear();
        debug!(conversation_id, "Cleared conversation");
        Ok(())
    }

    // === Store / retrieve / update / delete ===

    pub async fn store(&self, subject: &str, request: StoreRequest) -> Result<Stored> {
        match request {
            StoreRequest::Turn {
                conversation_id,
                role,
                content,
                token_count,
            } => {
                self.authorize(subject, &conversation_resource(&conversation_id), Action::Write)
                    .await?;
                let conversation = self.conversation(&conversation_id).await?;
                let mut context = conversation.lock().await;
                let compression = context.add(role, content, token_count);
                if let Some(report) = &compression {
                    info!(
                        conversation_id = %conversation_id,
                        evicted = report.evicted,
                        tokens_after = report.tokens_after,
                        "Context compressed"
                    );
                }
                Ok(Stored::Turn {
                    turn_count: context.len(),
                    total_tokens: context.token_count(),
                    conversation_id,
                    compression,
                })
            }
            StoreRequest::Fact {
                content,
                node_type,
                parent_ids,
                metadata,
            } => {
                self.authorize(subject, GRAPH_RESOURCE, Action::Write).await?;
                let outcome =
                    self.graph
                        .lock()
                        .await
                        .add_node(content, node_type, &parent_ids, metadata);
                Ok(Stored::Fact(outcome))
            }
            StoreRequest::Semantic {
                content,
                embedding,
                mut metadata,
                id,
            } => {
                self.authorize(subject, INDEX_RESOURCE, Action::Write).await?;
                let vector = match embedding {
                    Some(vector) => vector,
                    None => self.embed(&content).await?,
                };
                metadata
                    .entry("content".to_string())
                    .or_insert_with(|| serde_json::Value::String(content));
                let id = self.index.lock().await.insert(vector, metadata, id)?;
                Ok(Stored::Semantic { id })
            }
        }
    }

    /// Merge recency, structure and semantics for a query
    pub async fn retrieve(&self, subject: &str, query: RetrievalQuery) -> Result<RetrievalContext> {
        self.authorize(subject, RETRIEVAL_RESOURCE, Action::Read).await?;

        let limit = query.limit.unwrap_or(self.config.max_retrieval_results);
        let mut result = RetrievalContext::empty();

        if let Some(conversation_id) = &query.conversation_id {
            let conversation = self.conversation(conversation_id).await?;
            result.recent = conversation.lock().await.get(query.max_recent_tokens);
        }

        let text = query.text.as_deref().map(str::trim).filter(|t| !t.is_empty());

        {
            let graph = self.graph.lock().await;
            collect_facts(&graph, &query, text, limit, self.config.default_traversal_depth, &mut result);
        }

        let vector = match (query.embedding, text) {
            (Some(vector), _) => Some(vector),
            (None, Some(text)) if self.embedder.is_some() => match self.embed(text).await {
                Ok(vector) => Some(vector),
                Err(e) => {
                    warn!(error = %e, "Query embedding failed, skipping semantic recall");
                    None
                }
            },
            _ => None,
        };
        if let Some(vector) = vector {
            result.semantic = self.index.lock().await.query(&vector, limit)?;
        }

        result.estimate_tokens();
        debug!(
            recent = result.recent.len(),
            facts = result.facts.len(),
            semantic = result.semantic.len(),
            total_tokens = result.total_tokens,
            "Retrieved context"
        );
        Ok(result)
    }

    /// Apply an update; `false` when the target does not exist
    pub async fn update(&self, subject: &str, request: UpdateRequest) -> Result<bool> {
        match request {
            UpdateRequest::Fact {
                id,
                content,
                metadata,
            } => {
                self.authorize(subject, &node_resource(&id), Action::Write)
                    .await?;
                Ok(self.graph.lock().await.update_node(&id, content, metadata))
            }
            UpdateRequest::Importance {
                conversation_id,
                turn_index,
                importance,
            } => {
                self.authorize(subject, &conversation_resource(&conversation_id), Action::Write)
                    .await?;
                let conversation = self.conversation(&conversation_id).await?;
                let updated = conversation
                    .lock()
                    .await
                    .set_importance(turn_index, importance);
                Ok(updated)
            }
        }
    }

    /// Forget something; `false` when it was already gone
    pub async fn delete(&self, subject: &str, target: MemoryRef) -> Result<bool> {
        match target {
            MemoryRef::Fact { id, recursive } => {
                self.authorize(subject, &node_resource(&id), Action::Delete)
                    .await?;
                Ok(self.graph.lock().await.delete_node(&id, recursive))
            }
            MemoryRef::Semantic { id } => {
                self.authorize(subject, INDEX_RESOURCE, Action::Delete).await?;
                Ok(self.index.lock().await.delete(&id))
            }
            MemoryRef::Conversation { id } => {
                self.authorize(subject, &conversation_resource(&id), Action::Delete)
                    .await?;
                let removed = self.conversations.write().await.remove(&id).is_some();
                if removed {
                    info!(conversation_id = %id, "Closed conversation");
                }
                Ok(removed)
            }
        }
    }

    /// Copy a turn into the graph and, given a vector, into the index
    pub async fn promote(
        &self,
        subject: &str,
        conversation_id: &str,
        turn_index: usize,
        promotion: Promotion,
    ) -> Result<Promoted> {
        self.authorize(subject, &conversation_resource(conversation_id), Action::Read)
            .await?;
        self.authorize(subject, GRAPH_RESOURCE, Action::Write).await?;

        let conversation = self.conversation(conversation_id).await?;
        let turn = conversation
            .lock()
            .await
            .turns()
            .get(turn_index)
            .cloned()
            .ok_or_else(|| {
                Error::not_found(format!(
                    "Turn {} not found in conversation {}",
                    turn_index, conversation_id
                ))
            })?;

        let mut metadata = Metadata::new();
        metadata.insert("role".into(), serde_json::json!(turn.role));
        metadata.insert("conversation_id".into(), serde_json::json!(conversation_id));
        metadata.insert("turn_index".into(), serde_json::json!(turn_index));
        metadata.insert("importance".into(), serde_json::json!(turn.importance));

        let vector = match promotion.embedding {
            Some(vector) => Some(vector),
            None if self.embedder.is_some() => Some(self.embed(&turn.content).await?),
            None => None,
        };

        let embedding_id = match vector {
            Some(vector) => {
                self.authorize(subject, INDEX_RESOURCE, Action::Write).await?;
                let mut index_metadata = metadata.clone();
                index_metadata.insert("content".into(), serde_json::json!(turn.content));
                Some(self.index.lock().await.insert(vector, index_metadata, None)?)
            }
            None => None,
        };

        let node = self.graph.lock().await.add_node(
            turn.content,
            promotion.node_type,
            &promotion.parent_ids,
            metadata,
        );
        if let Some(embedding_id) = &embedding_id {
            let mut link = Metadata::new();
            link.insert("embedding_id".into(), serde_json::json!(embedding_id));
            self.graph.lock().await.update_node(&node.id, None, Some(link));
        }

        info!(
            conversation_id,
            turn_index,
            node_id = %node.id,
            embedded = embedding_id.is_some(),
            "Promoted turn"
        );
        Ok(Promoted { node, embedding_id })
    }

    /// Summary from the completion model, or the structural digest
    pub async fn summarize(&self, subject: &str, conversation_id: &str) -> Result<String> {
        self.authorize(subject, &conversation_resource(conversation_id), Action::Read)
            .await?;
        let conversation = self.conversation(conversation_id).await?;
        let (digest, transcript) = {
            let context = conversation.lock().await;
            let transcript: Vec<String> = context
                .get(None)
                .iter()
                .map(|m| format!("{}: {}", m.role, m.content))
                .collect();
            (context.summarize(), transcript)
        };

        let Some(completer) = &self.completer else {
            return Ok(digest);
        };
        if transcript.is_empty() {
            return Ok(digest);
        }

        let prompt = format!(
            "Summarize the following conversation in a few sentences, keeping facts and decisions.\n\n{}",
            transcript.join("\n")
        );
        match completer.complete(&prompt).await {
            Ok(summary) if !summary.trim().is_empty() => Ok(summary),
            Ok(_) => Ok(digest),
            Err(e) => {
                warn!(conversation_id, error = %e, "Summary provider failed, using digest");
                Ok(digest)
            }
        }
    }

    // === Graph and index access ===

    /// Look up a fact, recording the access
    pub async fn get_node(&self, subject: &str, id: &str) -> Result<Option<MemoryNode>> {
        self.authorize(subject, &node_resource(id), Action::Read).await?;
        Ok(self.graph.lock().await.get_node(id).cloned())
    }

    pub async fn traverse(
        &self,
        subject: &str,
        id: &str,
        traversal: Traversal,
        max_depth: Option<usize>,
    ) -> Result<Vec<MemoryNode>> {
        self.authorize(subject, &node_resource(id), Action::Read).await?;
        let depth = max_depth.unwrap_or(self.config.default_traversal_depth);
        let graph = self.graph.lock().await;
        let nodes = match traversal {
            Traversal::Parents => graph.get_parents(id),
            Traversal::Children => graph.get_children(id),
            Traversal::Ancestors => graph.get_ancestors(id, depth),
            Traversal::Descendants => graph.get_descendants(id, depth),
        };
        Ok(nodes.into_iter().cloned().collect())
    }

    /// Content search, or type search when `query` is absent
    pub async fn search_nodes(
        &self,
        subject: &str,
        query: Option<&str>,
        node_type: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<(MemoryNode, f64)>> {
        self.authorize(subject, GRAPH_RESOURCE, Action::Read).await?;
        let limit = limit.unwrap_or(self.config.max_retrieval_results);
        let graph = self.graph.lock().await;

        let matches: Vec<(MemoryNode, f64)> = match query {
            Some(query) => graph
                .search_by_content(query, usize::MAX)
                .into_iter()
                .filter(|(node, _)| node_type.map_or(true, |t| node.node_type == t))
                .take(limit)
                .map(|(node, score)| (node.clone(), score))
                .collect(),
            None => {
                let mut nodes = match node_type {
                    Some(t) => graph.search_by_type(t),
                    None => graph.nodes().collect(),
                };
                nodes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
                nodes.into_iter().take(limit).map(|n| (n.clone(), 0.0)).collect()
            }
        };
        Ok(matches)
    }

    /// Nearest neighbours of `vector`
    pub async fn similar(&self, subject: &str, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.authorize(subject, INDEX_RESOURCE, Action::Read).await?;
        self.index.lock().await.query(vector, k)
    }

    pub async fn graph_len(&self) -> usize {
        self.graph.lock().await.len()
    }

    pub async fn index_len(&self) -> usize {
        self.index.lock().await.len()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedder = self.embedder.as_ref().ok_or_else(|| {
            Error::invalid_input("No embedding supplied and no embedding provider configured")
        })?;
        let vector = embedder
            .embed(text)
            .await
            .map_err(|e| Error::provider(format!("Embedding failed: {}", e)))?;
        if vector.len() != self.config.embedding_dimensions {
            return Err(Error::dimension_mismatch(
                self.config.embedding_dimensions,
                vector.len(),
            ));
        }
        Ok(vector)
    }
}

/// Graph half of a retrieval
fn collect_facts(
    graph: &MemoryGraph,
    query: &RetrievalQuery,
    text: Option<&str>,
    limit: usize,
    default_depth: usize,
    result: &mut RetrievalContext,
) {
    let type_matches = |node: &MemoryNode| {
        query
            .node_type
            .as_deref()
            .map_or(true, |t| node.node_type == t)
    };

    match text {
        Some(text) => {
            let hits = graph
                .search_by_content(text, usize::MAX)
                .into_iter()
                .filter(|(node, _)| type_matches(node))
                .take(limit);
            for (node, score) in hits {
                result.push_fact(RetrievedFact::from_node(node, score, FactSource::ContentMatch));
            }
        }
        None => {
            if let Some(node_type) = &query.node_type {
                let mut nodes = graph.search_by_type(node_type);
                nodes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
                for node in nodes.into_iter().take(limit) {
                    result.push_fact(RetrievedFact::from_node(node, 0.0, FactSource::TypeMatch));
                }
            }
        }
    }

    if let Some(anchor) = &query.anchor_id {
        if !graph.contains(anchor) {
            warn!(node_id = %anchor, "Retrieval anchor not found");
            return;
        }
        let depth = query.traversal_depth.unwrap_or(default_depth);
        for node in graph.get_ancestors(anchor, depth).into_iter().take(limit) {
            result.push_fact(RetrievedFact::from_node(node, 0.0, FactSource::Ancestor));
        }
        for node in graph.get_descendants(anchor, depth).into_iter().take(limit) {
            result.push_fact(RetrievedFact::from_node(node, 0.0, FactSource::Descendant));
        }
    }
}

fn conversation_resource(id: &str) -> String {
    format!("conversation:{}", id)
}

fn node_resource(id: &str) -> String {
    format!("node:{}", id)
}
