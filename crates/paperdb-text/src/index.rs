use std::fmt::Display;
use std::ops::Bound;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use tantivy::collector::{FacetCollector, TopDocs};
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, RangeQuery, TermQuery};
use tantivy::schema::{Facet, Field, IndexRecordOption, Value};
use tantivy::{doc, Index, IndexWriter, TantivyDocument, Term};
use tracing::debug;

use paperdb_core::error::{Result, SearchError};
use paperdb_core::facet::{date_to_epoch_ms, FacetPredicate};
use paperdb_core::traits::LexicalIndex;
use paperdb_core::types::{Chunk, DocMeta, ScoredHit, StoredChunk};

use crate::tantivy_utils::{build_schema, register_tokenizer};

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Tantivy-backed lexical index, one tantivy document per chunk.
///
/// Explicit open/close lifecycle: [`TantivyChunkIndex::open`] creates or
/// reopens the on-disk index; dropping the value releases the writer lock.
/// Multiple instances over distinct directories are independent, which is
/// what the tests rely on.
pub struct TantivyChunkIndex {
    index: Index,
    writer: Mutex<IndexWriter<TantivyDocument>>,
    id_field: Field,
    doc_id_field: Field,
    ordinal_field: Field,
    title_field: Field,
    text_field: Field,
    authors_field: Field,
    category_field: Field,
    category_facet_field: Field,
    published_field: Field,
}

impl TantivyChunkIndex {
    /// Open the index at `index_dir`, creating it when absent.
    pub fn open(index_dir: &Path) -> Result<Self> {
        let index = if index_dir.join("meta.json").exists() {
            Index::open_in_dir(index_dir).map_err(corrupt)?
        } else {
            std::fs::create_dir_all(index_dir).map_err(corrupt)?;
            Index::create_in_dir(index_dir, build_schema()).map_err(corrupt)?
        };
        register_tokenizer(&index);

        let schema = index.schema();
        let field = |name: &str| schema.get_field(name).map_err(corrupt);
        let writer = index.writer(WRITER_HEAP_BYTES).map_err(corrupt)?;
        Ok(Self {
            writer: Mutex::new(writer),
            id_field: field("id")?,
            doc_id_field: field("doc_id")?,
            ordinal_field: field("ordinal")?,
            title_field: field("title")?,
            text_field: field("text")?,
            authors_field: field("authors")?,
            category_field: field("category")?,
            category_facet_field: field("category_facet")?,
            published_field: field("published")?,
            index,
        })
    }

    /// Per-category result counts for a query, for facet widgets.
    pub fn facet_counts(&self, terms: &str) -> Result<Vec<(String, u64)>> {
        let reader = self.index.reader().map_err(corrupt)?;
        let searcher = reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.title_field, self.text_field]);
        let (query, _) = parser.parse_query_lenient(terms);

        let mut collector = FacetCollector::for_field("category_facet");
        collector.add_facet(Facet::root());
        let counts = searcher.search(&query, &collector).map_err(corrupt)?;
        Ok(counts
            .get(&Facet::root().to_string())
            .map(|(facet, count)| (facet.to_string(), count))
            .collect())
    }

    /// Translate the pushable part of a predicate into a tantivy query.
    ///
    /// Returns `None` when the clause (or, for `Or`, any branch) has no
    /// exact index-native equivalent — notably author substring matches.
    /// For `And` a pushable subset still narrows safely because the
    /// orchestrator re-applies the full predicate afterwards.
    fn pushdown(&self, pred: &FacetPredicate) -> Option<Box<dyn Query>> {
        match pred {
            FacetPredicate::Eq { field, value } if field == "category" => {
                Some(Box::new(TermQuery::new(
                    Term::from_field_text(self.category_field, value),
                    IndexRecordOption::Basic,
                )))
            }
            FacetPredicate::Eq { .. } => None,
            FacetPredicate::In { field, values } if field == "category" && !values.is_empty() => {
                let clauses: Vec<(Occur, Box<dyn Query>)> = values
                    .iter()
                    .map(|v| {
                        let q: Box<dyn Query> = Box::new(TermQuery::new(
                            Term::from_field_text(self.category_field, v),
                            IndexRecordOption::Basic,
                        ));
                        (Occur::Should, q)
                    })
                    .collect();
                Some(Box::new(BooleanQuery::new(clauses)))
            }
            FacetPredicate::In { .. } => None,
            FacetPredicate::DateRange { from, to } => {
                let lower = match from {
                    Some(f) => Bound::Included(Term::from_field_i64(
                        self.published_field,
                        date_to_epoch_ms(*f),
                    )),
                    None => Bound::Unbounded,
                };
                let upper = match to {
                    Some(t) => Bound::Included(Term::from_field_i64(
                        self.published_field,
                        date_to_epoch_ms(*t),
                    )),
                    None => Bound::Unbounded,
                };
                Some(Box::new(RangeQuery::new(lower, upper)))
            }
            FacetPredicate::And { clauses } => {
                let pushed: Vec<(Occur, Box<dyn Query>)> = clauses
                    .iter()
                    .filter_map(|c| self.pushdown(c))
                    .map(|q| (Occur::Must, q))
                    .collect();
                if pushed.is_empty() {
                    None
                } else {
                    Some(Box::new(BooleanQuery::new(pushed)))
                }
            }
            FacetPredicate::Or { clauses } => {
                let pushed: Vec<(Occur, Box<dyn Query>)> = clauses
                    .iter()
                    .map(|c| self.pushdown(c).map(|q| (Occur::Should, q)))
                    .collect::<Option<Vec<_>>>()?;
                if pushed.is_empty() {
                    None
                } else {
                    Some(Box::new(BooleanQuery::new(pushed)))
                }
            }
        }
    }

    fn stored_chunk(&self, doc: &TantivyDocument) -> Result<StoredChunk> {
        let get_str = |field: Field, name: &str| -> Result<String> {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| SearchError::IndexCorrupt {
                    index: "lexical",
                    reason: format!("stored field '{name}' missing"),
                })
        };
        let published_ms = doc
            .get_first(self.published_field)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| SearchError::IndexCorrupt {
                index: "lexical",
                reason: "stored field 'published' missing".to_string(),
            })?;
        let published = paperdb_core::facet::epoch_ms_to_date(published_ms)
            .ok_or_else(|| SearchError::IndexCorrupt {
                index: "lexical",
                reason: format!("stored 'published' out of range: {published_ms}"),
            })?;
        let authors_joined = get_str(self.authors_field, "authors")?;
        Ok(StoredChunk {
            chunk_id: get_str(self.id_field, "id")?,
            doc_id: get_str(self.doc_id_field, "doc_id")?,
            ordinal: doc
                .get_first(self.ordinal_field)
                .and_then(|v| v.as_i64())
                .unwrap_or(0) as usize,
            text: get_str(self.text_field, "text")?,
            meta: DocMeta {
                title: get_str(self.title_field, "title")?,
                authors: authors_joined
                    .split("; ")
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
                category: get_str(self.category_field, "category")?,
                published,
            },
        })
    }
}

#[async_trait]
impl LexicalIndex for TantivyChunkIndex {
    async fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| lock_poisoned())?;
        for chunk in chunks {
            writer.delete_term(Term::from_field_text(self.id_field, &chunk.id));
            let facet_path = format!("/{}", chunk.meta.category.replace('.', "/"));
            writer
                .add_document(doc!(
                    self.id_field => chunk.id.clone(),
                    self.doc_id_field => chunk.doc_id.clone(),
                    self.ordinal_field => chunk.ordinal as i64,
                    self.title_field => chunk.meta.title.clone(),
                    self.text_field => chunk.text.clone(),
                    self.authors_field => chunk.meta.authors_joined(),
                    self.category_field => chunk.meta.category.clone(),
                    self.category_facet_field => Facet::from(facet_path.as_str()),
                    self.published_field => date_to_epoch_ms(chunk.meta.published),
                ))
                .map_err(corrupt)?;
        }
        writer.commit().map_err(corrupt)?;
        debug!(chunks = chunks.len(), "lexical upsert committed");
        Ok(())
    }

    async fn query(
        &self,
        terms: &str,
        k: usize,
        filter: Option<&FacetPredicate>,
    ) -> Result<Vec<ScoredHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let reader = self.index.reader().map_err(corrupt)?;
        let searcher = reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.title_field, self.text_field]);
        let (user_query, _) = parser.parse_query_lenient(terms);

        let query: Box<dyn Query> = match filter.and_then(|f| self.pushdown(f)) {
            Some(filter_query) => Box::new(BooleanQuery::new(vec![
                (Occur::Must, user_query),
                (Occur::Must, filter_query),
            ])),
            None => user_query,
        };

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(k))
            .map_err(corrupt)?;
        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc: TantivyDocument = searcher.doc(addr).map_err(corrupt)?;
            let stored = self.stored_chunk(&doc)?;
            hits.push(ScoredHit { chunk_id: stored.chunk_id.clone(), score, stored });
        }
        // BM25 is deterministic for a fixed corpus; equal scores fall back
        // to chunk id order.
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        Ok(hits)
    }

    async fn delete_document(&self, doc_id: &str) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| lock_poisoned())?;
        writer.delete_term(Term::from_field_text(self.doc_id_field, doc_id));
        writer.commit().map_err(corrupt)?;
        Ok(())
    }
}

fn corrupt(e: impl Display) -> SearchError {
    SearchError::IndexCorrupt { index: "lexical", reason: e.to_string() }
}

fn lock_poisoned() -> SearchError {
    SearchError::IndexCorrupt { index: "lexical", reason: "writer lock poisoned".to_string() }
}
