//! Lexical retrieval: a tantivy-backed BM25 inverted index over chunk text.

mod index;
mod tantivy_utils;

pub use index::TantivyChunkIndex;
pub use tantivy_utils::{build_schema, register_tokenizer};
