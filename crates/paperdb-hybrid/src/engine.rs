use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};
use tracing::{debug, info, info_span, warn, Instrument};

use paperdb_core::config::EngineConfig;
use paperdb_core::chunker::Chunker;
use paperdb_core::error::{Result, SearchError};
use paperdb_core::traits::{Embedder, LexicalIndex, QueryExpander, VectorIndex};
use paperdb_core::types::{
    ChunkFailure, Document, FusedResult, IngestReport, IngestStatus, Query,
};

use crate::expand::maybe_expand;
use crate::fusion;

/// Pipeline stage a search request has reached. Logged on every
/// transition; a failed request logs the stage it got to.
#[derive(Debug, Clone, Copy)]
enum Phase {
    Received,
    Expanded,
    Retrieved,
    Filtered,
    Fused,
    Done,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::Received => "received",
            Phase::Expanded => "expanded",
            Phase::Retrieved => "retrieved",
            Phase::Filtered => "filtered",
            Phase::Fused => "fused",
            Phase::Done => "done",
        }
    }
}

/// Orchestrates the two retrieval engines and the external ML services.
///
/// Retrieval always runs both engines concurrently and fuses their lists;
/// if the query embedding cannot be produced the request degrades to
/// lexical-only instead of failing. Facet filters are pushed down to the
/// indexes as a hint and re-applied here, so results are identical whether
/// or not an index honored the pushdown.
pub struct HybridEngine<L, V> {
    lexical: L,
    vector: V,
    embedder: Arc<dyn Embedder>,
    expander: Arc<dyn QueryExpander>,
    chunker: Chunker,
    config: EngineConfig,
}

impl<L, V> HybridEngine<L, V>
where
    L: LexicalIndex,
    V: VectorIndex,
{
    pub fn new(
        lexical: L,
        vector: V,
        embedder: Arc<dyn Embedder>,
        expander: Arc<dyn QueryExpander>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        if embedder.dim() != vector.dim() {
            return Err(SearchError::InvalidConfig(format!(
                "embedder dimension {} does not match vector index dimension {}",
                embedder.dim(),
                vector.dim()
            )));
        }
        let chunker = Chunker::new(config.chunking.clone())?;
        Ok(Self { lexical, vector, embedder, expander, chunker, config })
    }

    pub fn lexical(&self) -> &L {
        &self.lexical
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one search request end to end: expansion gate, concurrent
    /// retrieval, post-filtering, fusion, truncation to `top_k`. The
    /// request runs under its own span and logs each phase it passes
    /// through; on failure the last phase reached is logged with the error.
    pub async fn search(&self, query: &Query) -> Result<Vec<FusedResult>> {
        let span = info_span!("search", query = %query.text);
        async {
            let mut phase = Phase::Received;
            let out = self.search_phases(query, &mut phase).await;
            match &out {
                Ok(results) => {
                    debug!(phase = Phase::Done.as_str(), results = results.len(), "search complete");
                }
                Err(e) => warn!(phase = phase.as_str(), error = %e, "search failed"),
            }
            out
        }
        .instrument(span)
        .await
    }

    async fn search_phases(
        &self,
        query: &Query,
        phase: &mut Phase,
    ) -> Result<Vec<FusedResult>> {
        if let Some(filter) = &query.filter {
            filter.validate()?;
        }
        let top_k = query
            .top_k
            .unwrap_or(self.config.search.default_limit)
            .min(self.config.search.max_limit);
        if top_k == 0 || query.text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let weights = query.weights.unwrap_or(self.config.fusion.weights);
        weights.validate()?;
        let policy = query.policy.unwrap_or(self.config.fusion.policy);

        let expanded =
            maybe_expand(self.expander.as_ref(), &self.config.expansion, &query.text).await;
        *phase = Phase::Expanded;
        debug!(
            phase = phase.as_str(),
            text = %expanded.text,
            provenance = ?expanded.provenance,
            "retrieval query prepared"
        );

        // Embedding failure is transient by definition; drop to
        // lexical-only rather than failing the request.
        let query_vector = match self.embedder.embed(&expanded.text).await {
            Ok(v) => Some(v),
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "query embedding failed, degrading to lexical-only");
                None
            }
            Err(e) => return Err(e),
        };

        // Oversample so chunks ranked low in one list can still win fusion.
        let fetch_k = top_k.saturating_mul(self.config.search.fetch_multiplier);
        let filter = query.filter.as_ref();
        let semantic_fut = async {
            match &query_vector {
                Some(v) => self.vector.query(v, fetch_k, filter).await,
                None => Ok(Vec::new()),
            }
        };
        let lexical_fut = self.lexical.query(&expanded.text, fetch_k, filter);
        let (semantic, lexical) = tokio::join!(semantic_fut, lexical_fut);
        let mut semantic = semantic?;
        let mut lexical = lexical?;
        *phase = Phase::Retrieved;
        debug!(
            phase = phase.as_str(),
            semantic = semantic.len(),
            lexical = lexical.len(),
            "candidate lists retrieved"
        );

        // Index pushdown is only a pre-filter; authoritative filtering
        // happens here against the stored metadata, before fusion, so
        // pushdown and non-pushdown paths normalize over the same set.
        if let Some(pred) = filter {
            semantic.retain(|h| pred.accepts(&h.stored.meta));
            lexical.retain(|h| pred.accepts(&h.stored.meta));
        }
        *phase = Phase::Filtered;
        debug!(
            phase = phase.as_str(),
            semantic = semantic.len(),
            lexical = lexical.len(),
            "candidates filtered"
        );

        let fused = fusion::fuse(&semantic, &lexical, policy, weights, self.config.fusion.rrf_c);
        *phase = Phase::Fused;
        debug!(phase = phase.as_str(), candidates = fused.len(), "lists fused");
        let results: Vec<FusedResult> = fused
            .into_iter()
            .take(top_k)
            .enumerate()
            .map(|(i, c)| FusedResult {
                chunk_id: c.chunk_id,
                doc_id: c.stored.doc_id,
                rank: i + 1,
                fused_score: c.fused_score,
                semantic_score: c.semantic_score,
                lexical_score: c.lexical_score,
                title: c.stored.meta.title,
                authors: c.stored.meta.authors,
                category: c.stored.meta.category,
                published: c.stored.meta.published,
                text: c.stored.text,
            })
            .collect();
        Ok(results)
    }

    /// Index one document: chunk, embed, then supersede any previous
    /// version and write vector before lexical. Embedding happens before
    /// the old version is deleted, so a failed ingest leaves the previous
    /// version searchable. A lexical failure rolls the vector writes back
    /// so the two indexes never diverge silently.
    pub async fn ingest(&self, doc: &Document) -> Result<IngestReport> {
        if doc.id.trim().is_empty() {
            return Err(SearchError::InvalidDocument {
                doc_id: doc.id.clone(),
                reason: "document id is empty".to_string(),
            });
        }
        let chunks = self.chunker.chunk(doc)?;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embed_with_retry(&texts).await?;

        self.vector.delete_document(&doc.id).await?;
        self.lexical.delete_document(&doc.id).await?;

        self.vector.upsert(&chunks, &embeddings).await?;
        if let Err(lexical_err) = self.lexical.upsert(&chunks).await {
            warn!(doc_id = %doc.id, error = %lexical_err, "lexical upsert failed, rolling back");
            if let Err(rollback_err) = self.vector.delete_document(&doc.id).await {
                warn!(doc_id = %doc.id, error = %rollback_err, "rollback failed");
                return Ok(IngestReport {
                    doc_id: doc.id.clone(),
                    chunks: chunks.len(),
                    status: IngestStatus::PartiallyIndexed,
                    failures: chunks
                        .iter()
                        .map(|c| ChunkFailure {
                            chunk_id: c.id.clone(),
                            reason: lexical_err.to_string(),
                        })
                        .collect(),
                });
            }
            return Err(lexical_err);
        }

        info!(doc_id = %doc.id, chunks = chunks.len(), "document indexed");
        Ok(IngestReport {
            doc_id: doc.id.clone(),
            chunks: chunks.len(),
            status: IngestStatus::Indexed,
            failures: Vec::new(),
        })
    }

    /// Ingest a batch with bounded parallelism, yielding per-document
    /// outcomes as each finishes. One failing document does not stop the
    /// rest, and callers can report progress while later documents are
    /// still in flight.
    pub fn ingest_all(
        &self,
        docs: Vec<Document>,
    ) -> impl Stream<Item = (String, Result<IngestReport>)> + '_ {
        let concurrency = self.config.embedding.concurrency;
        stream::iter(docs)
            .map(move |doc| async move {
                let id = doc.id.clone();
                (id, self.ingest(&doc).await)
            })
            .buffer_unordered(concurrency)
    }

    async fn embed_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let cfg = &self.config.embedding;
        let mut attempt: u32 = 0;
        loop {
            match self.embedder.embed_batch(texts).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(e) if e.is_retryable() && attempt < cfg.max_retries => {
                    let backoff = Duration::from_millis(cfg.backoff_ms << attempt.min(8));
                    warn!(attempt, error = %e, backoff_ms = backoff.as_millis() as u64, "embedding failed, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
