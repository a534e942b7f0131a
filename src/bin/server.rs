//! Dieah Recall Server
//!
//! HTTP API for the memory layer.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dieah_recall::{
    config::Config,
    facade::{
        MemoryFacade, MemoryRef, Promoted, Promotion, RetrievalQuery, StoreRequest, Stored,
        Traversal, UpdateRequest,
    },
    graph::MemoryNode,
    index::SearchHit,
    message::{ContextMessage, Role},
    retrieval::RetrievedFact,
    Error, Metadata,
};

type SharedState = Arc<MemoryFacade>;

/// Config file path; defaults apply when unset
const CONFIG_ENV: &str = "DIEAH_RECALL_CONFIG";

/// Header naming the caller for authorization
const SUBJECT_HEADER: &str = "x-subject";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match std::env::var(CONFIG_ENV) {
        Ok(path) => Config::load(&path)?,
        Err(_) => Config::default(),
    };
    tracing::info!("Starting Dieah Recall Server on port {}", config.server_port);
    tracing::info!("Data directory: {:?}", config.data_dir);

    let port = config.server_port;
    let state: SharedState = Arc::new(MemoryFacade::open(config)?);

    // Build router
    let app = Router::new()
        // Health check
        .route("/health", get(health))
        // Conversations
        .route("/conversations", get(list_conversations).post(open_conversation))
        .route("/conversations/:id", delete(close_conversation))
        .route("/conversations/:id/turns", get(get_turns).post(add_turn))
        .route("/conversations/:id/summary", get(summarize))
        .route("/conversations/:id/clear", post(clear_conversation))
        .route("/conversations/:id/turns/:index/importance", put(set_importance))
        .route("/conversations/:id/turns/:index/promote", post(promote_turn))
        // Graph
        .route("/nodes", get(search_nodes).post(create_node))
        .route(
            "/nodes/:id",
            get(get_node).patch(update_node).delete(delete_node),
        )
        .route("/nodes/:id/:traversal", get(traverse))
        // Embeddings
        .route("/vectors", post(insert_vector))
        .route("/vectors/query", post(query_vectors))
        .route("/vectors/:id", delete(delete_vector))
        // Retrieval
        .route("/retrieve", post(retrieve_context))
        // Token counting
        .route("/tokens/count", post(count_tokens))
        .route("/tokens/budget/:conversation_id", get(get_token_budget))
        .layer(TraceLayer::new_for_http())
        // Add CORS
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("Server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;

    Ok(())
}

fn subject(headers: &HeaderMap) -> String {
    headers
        .get(SUBJECT_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("anonymous")
        .to_string()
}

fn error_status(err: Error) -> StatusCode {
    let status = match &err {
        Error::DimensionMismatch { .. } | Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::Unauthorized { .. } => StatusCode::FORBIDDEN,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "Request failed");
    } else {
        tracing::debug!(error = %err, status = %status, "Request rejected");
    }
    status
}

// === Handlers ===

async fn health() -> &'static str {
    "ok"
}

// --- Conversation handlers ---

#[derive(Debug, Serialize)]
struct ConversationResponse {
    id: String,
}

async fn open_conversation(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<ConversationResponse>, StatusCode> {
    let id = state
        .open_conversation(&subject(&headers))
        .await
        .map_err(error_status)?;
    Ok(Json(ConversationResponse { id }))
}

async fn list_conversations(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<Vec<String>>, StatusCode> {
    let ids = state
        .list_conversations(&subject(&headers))
        .await
        .map_err(error_status)?;
    Ok(Json(ids))
}

async fn close_conversation(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let removed = state
        .delete(&subject(&headers), MemoryRef::Conversation { id })
        .await
        .map_err(error_status)?;
    Ok(if removed {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    })
}

#[derive(Debug, Deserialize)]
struct AddTurnRequest {
    role: Role,
    content: String,
    token_count: Option<u32>,
}

async fn add_turn(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<AddTurnRequest>,
) -> Result<Json<Stored>, StatusCode> {
    let stored = state
        .store(
            &subject(&headers),
            StoreRequest::Turn {
                conversation_id: id,
                role: req.role,
                content: req.content,
                token_count: req.token_count,
            },
        )
        .await
        .map_err(error_status)?;
    Ok(Json(stored))
}

#[derive(Debug, Deserialize)]
struct GetTurnsQuery {
    max_tokens: Option<u32>,
}

async fn get_turns(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<GetTurnsQuery>,
) -> Result<Json<Vec<ContextMessage>>, StatusCode> {
    let turns = state
        .conversation_slice(&subject(&headers), &id, query.max_tokens)
        .await
        .map_err(error_status)?;
    Ok(Json(turns))
}

#[derive(Debug, Serialize)]
struct SummaryResponse {
    summary: String,
}

async fn summarize(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<SummaryResponse>, StatusCode> {
    let summary = state
        .summarize(&subject(&headers), &id)
        .await
        .map_err(error_status)?;
    Ok(Json(SummaryResponse { summary }))
}

async fn clear_conversation(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    state
        .clear_conversation(&subject(&headers), &id)
        .await
        .map_err(error_status)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ImportanceRequest {
    importance: f64,
}

async fn set_importance(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path((id, index)): Path<(String, usize)>,
    Json(req): Json<ImportanceRequest>,
) -> Result<StatusCode, StatusCode> {
    let updated = state
        .update(
            &subject(&headers),
            UpdateRequest::Importance {
                conversation_id: id,
                turn_index: index,
                importance: req.importance,
            },
        )
        .await
        .map_err(error_status)?;
    Ok(if updated {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    })
}

async fn promote_turn(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path((id, index)): Path<(String, usize)>,
    Json(promotion): Json<Promotion>,
) -> Result<Json<Promoted>, StatusCode> {
    let promoted = state
        .promote(&subject(&headers), &id, index, promotion)
        .await
        .map_err(error_status)?;
    Ok(Json(promoted))
}

// --- Node handlers ---

#[derive(Debug, Deserialize)]
struct CreateNodeRequest {
    content: String,
    node_type: String,
    #[serde(default)]
    parent_ids: Vec<String>,
    #[serde(default)]
    metadata: Metadata,
}

async fn create_node(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<CreateNodeRequest>,
) -> Result<Json<Stored>, StatusCode> {
    let stored = state
        .store(
            &subject(&headers),
            StoreRequest::Fact {
                content: req.content,
                node_type: req.node_type,
                parent_ids: req.parent_ids,
                metadata: req.metadata,
            },
        )
        .await
        .map_err(error_status)?;
    Ok(Json(stored))
}

async fn get_node(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<NodeResponse>, StatusCode> {
    let node = state
        .get_node(&subject(&headers), &id)
        .await
        .map_err(error_status)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(NodeResponse::from(node)))
}

#[derive(Debug, Deserialize)]
struct UpdateNodeRequest {
    content: Option<String>,
    metadata: Option<Metadata>,
}

async fn update_node(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateNodeRequest>,
) -> Result<StatusCode, StatusCode> {
    let updated = state
        .update(
            &subject(&headers),
            UpdateRequest::Fact {
                id,
                content: req.content,
                metadata: req.metadata,
            },
        )
        .await
        .map_err(error_status)?;
    Ok(if updated {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    })
}

#[derive(Debug, Deserialize)]
struct DeleteNodeQuery {
    recursive: Option<bool>,
}

async fn delete_node(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<DeleteNodeQuery>,
) -> Result<StatusCode, StatusCode> {
    let deleted = state
        .delete(
            &subject(&headers),
            MemoryRef::Fact {
                id,
                recursive: query.recursive.unwrap_or(false),
            },
        )
        .await
        .map_err(error_status)?;
    Ok(if deleted {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    })
}

#[derive(Debug, Deserialize)]
struct TraverseQuery {
    depth: Option<usize>,
}

async fn traverse(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path((id, traversal)): Path<(String, Traversal)>,
    Query(query): Query<TraverseQuery>,
) -> Result<Json<Vec<NodeResponse>>, StatusCode> {
    let nodes = state
        .traverse(&subject(&headers), &id, traversal, query.depth)
        .await
        .map_err(error_status)?;
    Ok(Json(nodes.into_iter().map(NodeResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
struct SearchNodesQuery {
    query: Option<String>,
    node_type: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct NodeMatchResponse {
    #[serde(flatten)]
    node: NodeResponse,
    score: f64,
}

async fn search_nodes(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<SearchNodesQuery>,
) -> Result<Json<Vec<NodeMatchResponse>>, StatusCode> {
    let matches = state
        .search_nodes(
            &subject(&headers),
            query.query.as_deref(),
            query.node_type.as_deref(),
            query.limit,
        )
        .await
        .map_err(error_status)?;
    Ok(Json(
        matches
            .into_iter()
            .map(|(node, score)| NodeMatchResponse {
                node: NodeResponse::from(node),
                score,
            })
            .collect(),
    ))
}

// --- Vector handlers ---

#[derive(Debug, Deserialize)]
struct InsertVectorRequest {
    content: String,
    vector: Option<Vec<f32>>,
    #[serde(default)]
    metadata: Metadata,
    id: Option<String>,
}

async fn insert_vector(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<InsertVectorRequest>,
) -> Result<Json<Stored>, StatusCode> {
    let stored = state
        .store(
            &subject(&headers),
            StoreRequest::Semantic {
                content: req.content,
                embedding: req.vector,
                metadata: req.metadata,
                id: req.id,
            },
        )
        .await
        .map_err(error_status)?;
    Ok(Json(stored))
}

#[derive(Debug, Deserialize)]
struct QueryVectorsRequest {
    vector: Vec<f32>,
    k: Option<usize>,
}

async fn query_vectors(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<QueryVectorsRequest>,
) -> Result<Json<Vec<SearchHit>>, StatusCode> {
    let k = req.k.unwrap_or(state.config().max_retrieval_results);
    let hits = state
        .similar(&subject(&headers), &req.vector, k)
        .await
        .map_err(error_status)?;
    Ok(Json(hits))
}

async fn delete_vector(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let deleted = state
        .delete(&subject(&headers), MemoryRef::Semantic { id })
        .await
        .map_err(error_status)?;
    Ok(if deleted {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    })
}

// --- Retrieval handlers ---

#[derive(Debug, Serialize)]
struct RetrieveResponse {
    recent_messages: Vec<ContextMessage>,
    facts: Vec<RetrievedFact>,
    semantic: Vec<SearchHit>,
    total_tokens: u64,
    formatted_context: String,
}

async fn retrieve_context(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(query): Json<RetrievalQuery>,
) -> Result<Json<RetrieveResponse>, StatusCode> {
    let context = state
        .retrieve(&subject(&headers), query)
        .await
        .map_err(error_status)?;

    let formatted_context = context.format_for_prompt();
    Ok(Json(RetrieveResponse {
        recent_messages: context.recent,
        facts: context.facts,
        semantic: context.semantic,
        total_tokens: context.total_tokens,
        formatted_context,
    }))
}

// --- Token handlers ---

#[derive(Debug, Deserialize)]
struct CountTokensRequest {
    text: String,
}

#[derive(Debug, Serialize)]
struct CountTokensResponse {
    tokens: u32,
}

async fn count_tokens(
    State(state): State<SharedState>,
    Json(req): Json<CountTokensRequest>,
) -> Json<CountTokensResponse> {
    let tokens = state.token_counter().count(&req.text);
    Json(CountTokensResponse { tokens })
}

#[derive(Debug, Serialize)]
struct TokenBudgetResponse {
    used: u64,
    limit: u32,
    remaining: u64,
    utilization: f32,
    status: String,
}

async fn get_token_budget(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
) -> Result<Json<TokenBudgetResponse>, StatusCode> {
    let budget = state
        .conversation_budget(&subject(&headers), &conversation_id)
        .await
        .map_err(error_status)?;

    Ok(Json(TokenBudgetResponse {
        used: budget.used,
        limit: budget.limit,
        remaining: budget.remaining(),
        utilization: budget.utilization(),
        status: budget.status().to_string(),
    }))
}

// === Response types ===

#[derive(Debug, Serialize)]
struct NodeResponse {
    id: String,
    content: String,
    node_type: String,
    metadata: Metadata,
    parent_ids: Vec<String>,
    child_ids: Vec<String>,
    created_at: String,
    last_accessed: String,
    access_count: u32,
}

impl From<MemoryNode> for NodeResponse {
    fn from(n: MemoryNode) -> Self {
        Self {
            id: n.id,
            content: n.content,
            node_type: n.node_type,
            metadata: n.metadata,
            parent_ids: n.parent_ids.into_iter().collect(),
            child_ids: n.child_ids.into_iter().collect(),
            created_at: n.created_at.to_rfc3339(),
            last_accessed: n.last_accessed.to_rfc3339(),
            access_count: n.access_count,
        }
    }
}
