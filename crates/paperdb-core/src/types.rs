//! Domain types used by the text and vector engines.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type ChunkId = String;

/// Structured metadata of a paper, denormalized onto every chunk so facet
/// filters can be evaluated without resolving the parent document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocMeta {
    pub title: String,
    pub authors: Vec<String>,
    pub category: String,
    pub published: NaiveDate,
}

impl DocMeta {
    /// Author list joined for display and for substring facet matching.
    pub fn authors_joined(&self) -> String {
        self.authors.join("; ")
    }
}

/// A source article. Immutable once ingested; re-ingesting under the same
/// id supersedes the previous version in both indexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub meta: DocMeta,
}

/// A contiguous segment of a document, the unit of indexing and retrieval.
///
/// `span` holds byte offsets into the parent document text; the union of
/// spans over a document's chunks covers the whole text. Ordinals are
/// contiguous starting at 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub doc_id: String,
    pub ordinal: usize,
    pub span: (usize, usize),
    pub text: String,
    pub meta: DocMeta,
}

impl Chunk {
    pub fn make_id(doc_id: &str, ordinal: usize) -> ChunkId {
        format!("{doc_id}:{ordinal}")
    }
}

/// The per-chunk payload an index stores and returns with each hit, enough
/// to assemble a final result without a second lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub chunk_id: ChunkId,
    pub doc_id: String,
    pub ordinal: usize,
    pub text: String,
    pub meta: DocMeta,
}

impl StoredChunk {
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            doc_id: chunk.doc_id.clone(),
            ordinal: chunk.ordinal,
            text: chunk.text.clone(),
            meta: chunk.meta.clone(),
        }
    }
}

/// A single-engine result. `score` is engine-specific (cosine similarity or
/// BM25); higher is always better. Scores are not comparable across engines,
/// which is why fusion normalizes per list.
#[derive(Debug, Clone)]
pub struct ScoredHit {
    pub chunk_id: ChunkId,
    pub score: f32,
    pub stored: StoredChunk,
}

/// How the two ranked lists are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionPolicy {
    /// Min-max normalize each list to [0,1], then weighted sum.
    WeightedMinMax,
    /// Reciprocal rank fusion: sum of 1/(rank + c) over the lists the chunk
    /// appears in.
    ReciprocalRank,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub semantic: f32,
    pub lexical: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self { semantic: 0.5, lexical: 0.5 }
    }
}

impl FusionWeights {
    /// Weights must be non-negative and sum to 1.
    pub fn validate(&self) -> crate::Result<()> {
        if self.semantic < 0.0 || self.lexical < 0.0 {
            return Err(crate::SearchError::InvalidConfig(
                "fusion weights must be non-negative".to_string(),
            ));
        }
        if (self.semantic + self.lexical - 1.0).abs() > 1e-3 {
            return Err(crate::SearchError::InvalidConfig(format!(
                "fusion weights must sum to 1, got {} + {}",
                self.semantic, self.lexical
            )));
        }
        Ok(())
    }
}

/// A search request. Transient, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    #[serde(default)]
    pub filter: Option<crate::facet::FacetPredicate>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub weights: Option<FusionWeights>,
    #[serde(default)]
    pub policy: Option<FusionPolicy>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            filter: None,
            top_k: None,
            weights: None,
            policy: None,
        }
    }
}

/// Whether the retrieval query text went through expansion or passed
/// through verbatim (including expansion-failure fallback).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Verbatim,
    Expanded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpandedQuery {
    pub text: String,
    pub provenance: Provenance,
}

/// Final externally visible result unit, with resolved document metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedResult {
    pub chunk_id: ChunkId,
    pub doc_id: String,
    pub rank: usize,
    pub fused_score: f32,
    /// Raw per-engine scores; `None` when the chunk was absent from that
    /// engine's candidate list.
    pub semantic_score: Option<f32>,
    pub lexical_score: Option<f32>,
    pub title: String,
    pub authors: Vec<String>,
    pub category: String,
    pub published: NaiveDate,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Indexed,
    /// One index holds chunks the other does not; the document must be
    /// re-ingested.
    PartiallyIndexed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub chunk_id: ChunkId,
    pub reason: String,
}

/// Per-document ingestion outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub doc_id: String,
    pub chunks: usize,
    pub status: IngestStatus,
    pub failures: Vec<ChunkFailure>,
}
