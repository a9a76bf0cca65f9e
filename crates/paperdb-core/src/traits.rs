//! Capability traits at the engine seams.
//!
//! The two indexes are independent retrieval backends behind a common
//! `query -> ranked list` contract so either can be swapped or mocked
//! without touching fusion. The external ML services (embedding, query
//! expansion) sit behind narrow interfaces so the core is testable with
//! deterministic fakes.

use async_trait::async_trait;

use crate::error::Result;
use crate::facet::FacetPredicate;
use crate::types::{Chunk, ScoredHit};

/// Maps text to fixed-dimension vectors. Implementations fail with
/// `EmbeddingUnavailable` or `EmbeddingTimeout`.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Dimensionality of every vector this embedder produces.
    fn dim(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Batched variant; result order matches input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Rewrites/enriches a query, adding at most `budget` terms. Failures are
/// `ExpansionUnavailable`/`ExpansionTimeout` and are never fatal to a
/// request; the caller falls back to the verbatim query.
#[async_trait]
pub trait QueryExpander: Send + Sync {
    async fn expand(&self, query: &str, budget: usize) -> Result<String>;
}

/// BM25-family inverted index over chunk text.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Idempotent per chunk id: replaces any prior entry.
    async fn upsert(&self, chunks: &[Chunk]) -> Result<()>;

    /// Ranked lookup, scores unbounded positive, ties broken by chunk id
    /// ascending. `filter` is a performance hint; callers must not rely on
    /// it being applied exactly (the orchestrator post-filters).
    async fn query(
        &self,
        terms: &str,
        k: usize,
        filter: Option<&FacetPredicate>,
    ) -> Result<Vec<ScoredHit>>;

    async fn delete_document(&self, doc_id: &str) -> Result<()>;
}

/// Nearest-neighbor index over chunk embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Fixed dimensionality shared by all embeddings in the index.
    fn dim(&self) -> usize;

    /// Idempotent per chunk id: replaces any prior entry. `embeddings`
    /// parallels `chunks`.
    async fn upsert(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()>;

    /// Ranked lookup by similarity (higher = closer), ties broken by chunk
    /// id ascending. Same filter contract as [`LexicalIndex::query`].
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&FacetPredicate>,
    ) -> Result<Vec<ScoredHit>>;

    async fn delete_document(&self, doc_id: &str) -> Result<()>;
}
