//! Collaborator interfaces consumed by the memory layer
//!
//! Model providers and authorization live outside this crate; the facade only
//! sees these traits.

use async_trait::async_trait;

use crate::error::Result;

/// Produces fixed-length embeddings for text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Length of every vector `embed` returns
    fn dimensions(&self) -> usize;
}

/// Produces text completions for a prompt
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// What a caller wants to do with a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
    Delete,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Read => write!(f, "read"),
            Action::Write => write!(f, "write"),
            Action::Delete => write!(f, "delete"),
        }
    }
}

/// Decides whether `subject` may perform `action` on `resource`
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn is_authorized(&self, subject: &str, resource: &str, action: Action) -> bool;
}

/// Authorizer that permits everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn is_authorized(&self, _subject: &str, _resource: &str, _action: Action) -> bool {
        true
    }
}
