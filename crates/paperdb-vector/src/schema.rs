//! Arrow schema for the chunk table. One row per chunk; metadata columns
//! are denormalized so `only_if` predicates can filter without a join.

use std::sync::Arc;

use arrow_array::{
    FixedSizeListArray, Int32Array, Int64Array, RecordBatch, StringArray,
};
use arrow_schema::{DataType, Field, Schema};

use paperdb_core::error::{Result, SearchError};
use paperdb_core::facet::date_to_epoch_ms;
use paperdb_core::types::Chunk;

pub fn build_chunk_schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("doc_id", DataType::Utf8, false),
        Field::new("ordinal", DataType::Int32, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("authors", DataType::Utf8, false),
        // Lowercased copy so author LIKE-pushdown needs no SQL function.
        Field::new("authors_lower", DataType::Utf8, false),
        Field::new("category", DataType::Utf8, false),
        Field::new("published", DataType::Int64, false),
        Field::new("text", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dim as i32,
            ),
            true,
        ),
    ]))
}

/// Pack chunks + embeddings into one record batch. Embedding lengths are
/// checked against `dim` before anything is written.
pub fn chunks_to_record_batch(
    chunks: &[Chunk],
    embeddings: &[Vec<f32>],
    dim: usize,
) -> Result<RecordBatch> {
    if chunks.len() != embeddings.len() {
        return Err(SearchError::InvalidConfig(format!(
            "{} chunks but {} embeddings",
            chunks.len(),
            embeddings.len()
        )));
    }
    for (chunk, emb) in chunks.iter().zip(embeddings) {
        if emb.len() != dim {
            return Err(SearchError::InvalidConfig(format!(
                "embedding for chunk '{}' has dimension {}, index expects {}",
                chunk.id,
                emb.len(),
                dim
            )));
        }
    }

    let mut ids = Vec::with_capacity(chunks.len());
    let mut doc_ids = Vec::with_capacity(chunks.len());
    let mut ordinals = Vec::with_capacity(chunks.len());
    let mut titles = Vec::with_capacity(chunks.len());
    let mut authors = Vec::with_capacity(chunks.len());
    let mut authors_lower = Vec::with_capacity(chunks.len());
    let mut categories = Vec::with_capacity(chunks.len());
    let mut published = Vec::with_capacity(chunks.len());
    let mut texts = Vec::with_capacity(chunks.len());
    let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(chunks.len());
    for (chunk, emb) in chunks.iter().zip(embeddings) {
        ids.push(chunk.id.clone());
        doc_ids.push(chunk.doc_id.clone());
        ordinals.push(chunk.ordinal as i32);
        titles.push(chunk.meta.title.clone());
        let joined = chunk.meta.authors_joined();
        authors_lower.push(joined.to_lowercase());
        authors.push(joined);
        categories.push(chunk.meta.category.clone());
        published.push(date_to_epoch_ms(chunk.meta.published));
        texts.push(chunk.text.clone());
        vectors.push(Some(emb.iter().map(|&x| Some(x)).collect()));
    }

    RecordBatch::try_new(
        build_chunk_schema(dim),
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(doc_ids)),
            Arc::new(Int32Array::from(ordinals)),
            Arc::new(StringArray::from(titles)),
            Arc::new(StringArray::from(authors)),
            Arc::new(StringArray::from(authors_lower)),
            Arc::new(StringArray::from(categories)),
            Arc::new(Int64Array::from(published)),
            Arc::new(StringArray::from(texts)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<
                arrow_array::types::Float32Type,
                _,
                _,
            >(vectors.into_iter(), dim as i32)),
        ],
    )
    .map_err(|e| SearchError::IndexCorrupt { index: "vector", reason: e.to_string() })
}
