use std::time::Duration;
use thiserror::Error;

/// Error taxonomy for the whole retrieval pipeline.
///
/// Transient external-service failures (`Embedding*`, `Expansion*`) are
/// retried or degraded by the orchestrator and only surface once retries
/// are exhausted. Structural failures (`InvalidDocument`, `UnknownFacet`,
/// `IndexCorrupt`) surface immediately with enough context to pinpoint the
/// offending document, chunk or field.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid document '{doc_id}': {reason}")]
    InvalidDocument { doc_id: String, reason: String },

    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("embedding request timed out after {0:?}")]
    EmbeddingTimeout(Duration),

    #[error("expansion service unavailable: {0}")]
    ExpansionUnavailable(String),

    #[error("expansion request timed out after {0:?}")]
    ExpansionTimeout(Duration),

    #[error("{index} index corrupt: {reason}")]
    IndexCorrupt { index: &'static str, reason: String },

    #[error("unknown facet field '{0}'")]
    UnknownFacet(String),

    #[error("document '{doc_id}' is partially indexed: {detail}")]
    PartiallyIndexed { doc_id: String, detail: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SearchError {
    /// Whether the ingestion pipeline may retry the failed call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SearchError::EmbeddingUnavailable(_) | SearchError::EmbeddingTimeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
