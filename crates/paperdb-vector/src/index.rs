use std::fmt::Display;
use std::path::Path;

use arrow_array::{Array, Float32Array, Int32Array, Int64Array, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use tracing::debug;

use paperdb_core::error::{Result, SearchError};
use paperdb_core::facet::{epoch_ms_to_date, FacetPredicate};
use paperdb_core::traits::VectorIndex;
use paperdb_core::types::{Chunk, DocMeta, ScoredHit, StoredChunk};

use crate::schema::{build_chunk_schema, chunks_to_record_batch};

/// LanceDB-backed vector index. Explicit lifecycle: [`LanceVectorIndex::open`]
/// connects and ensures the table; independent instances over distinct
/// paths do not share state.
pub struct LanceVectorIndex {
    db: Connection,
    table_name: String,
    dim: usize,
}

impl LanceVectorIndex {
    pub async fn open(db_path: &Path, table_name: &str, dim: usize) -> Result<Self> {
        let db = connect(db_path.to_string_lossy().as_ref())
            .execute()
            .await
            .map_err(corrupt)?;
        let index = Self { db, table_name: table_name.to_string(), dim };
        index.ensure_table().await?;
        Ok(index)
    }

    async fn ensure_table(&self) -> Result<()> {
        let names = self.db.table_names().execute().await.map_err(corrupt)?;
        if names.contains(&self.table_name) {
            return Ok(());
        }
        let schema = build_chunk_schema(self.dim);
        let empty = RecordBatchIterator::new(vec![].into_iter(), schema);
        self.db
            .create_table(&self.table_name, Box::new(empty))
            .execute()
            .await
            .map_err(corrupt)?;
        Ok(())
    }

    /// Remove a single chunk entry.
    pub async fn delete_chunk(&self, chunk_id: &str) -> Result<()> {
        let table = self.db.open_table(&self.table_name).execute().await.map_err(corrupt)?;
        table
            .delete(&format!("id = '{}'", chunk_id.replace('\'', "''")))
            .await
            .map_err(corrupt)?;
        Ok(())
    }

    fn hit_from_row(batch: &arrow_array::RecordBatch, row: usize) -> Result<ScoredHit> {
        let str_col = |name: &str| -> Result<String> {
            batch
                .column_by_name(name)
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .map(|a| a.value(row).to_string())
                .ok_or_else(|| missing_column(name))
        };
        let published_ms = batch
            .column_by_name("published")
            .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
            .map(|a| a.value(row))
            .ok_or_else(|| missing_column("published"))?;
        let ordinal = batch
            .column_by_name("ordinal")
            .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
            .map(|a| a.value(row))
            .ok_or_else(|| missing_column("ordinal"))?;
        let distance = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
            .map(|a| a.value(row))
            .ok_or_else(|| missing_column("_distance"))?;

        let published = epoch_ms_to_date(published_ms).ok_or_else(|| SearchError::IndexCorrupt {
            index: "vector",
            reason: format!("stored 'published' out of range: {published_ms}"),
        })?;
        let chunk_id = str_col("id")?;
        Ok(ScoredHit {
            chunk_id: chunk_id.clone(),
            // LanceDB reports distance; flip to a similarity where higher
            // is better, matching the lexical contract.
            score: 1.0 - distance,
            stored: StoredChunk {
                chunk_id,
                doc_id: str_col("doc_id")?,
                ordinal: ordinal as usize,
                text: str_col("text")?,
                meta: DocMeta {
                    title: str_col("title")?,
                    authors: str_col("authors")?
                        .split("; ")
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect(),
                    category: str_col("category")?,
                    published,
                },
            },
        })
    }
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn upsert(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let batch = chunks_to_record_batch(chunks, embeddings, self.dim)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));

        let table = self.db.open_table(&self.table_name).execute().await.map_err(corrupt)?;
        // merge_insert on id: replaces matching rows, inserts the rest.
        let mut merge = table.merge_insert(&["id"]);
        merge.when_matched_update_all(None).when_not_matched_insert_all();
        merge.execute(reader).await.map_err(corrupt)?;
        debug!(chunks = chunks.len(), table = %self.table_name, "vector upsert merged");
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&FacetPredicate>,
    ) -> Result<Vec<ScoredHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if vector.len() != self.dim {
            return Err(SearchError::InvalidConfig(format!(
                "query vector has dimension {}, index expects {}",
                vector.len(),
                self.dim
            )));
        }
        let table = self.db.open_table(&self.table_name).execute().await.map_err(corrupt)?;
        let mut query = table
            .vector_search(vector.to_vec())
            .map_err(corrupt)?
            .limit(k);
        if let Some(pred) = filter {
            query = query.only_if(pred.to_lance_sql());
        }
        let mut stream = query.execute().await.map_err(corrupt)?;

        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(corrupt)? {
            for row in 0..batch.num_rows() {
                hits.push(Self::hit_from_row(&batch, row)?);
            }
        }
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete_document(&self, doc_id: &str) -> Result<()> {
        let table = self.db.open_table(&self.table_name).execute().await.map_err(corrupt)?;
        table
            .delete(&format!("doc_id = '{}'", doc_id.replace('\'', "''")))
            .await
            .map_err(corrupt)?;
        Ok(())
    }
}

fn corrupt(e: impl Display) -> SearchError {
    SearchError::IndexCorrupt { index: "vector", reason: e.to_string() }
}

fn missing_column(name: &str) -> SearchError {
    SearchError::IndexCorrupt {
        index: "vector",
        reason: format!("result column '{name}' missing"),
    }
}
