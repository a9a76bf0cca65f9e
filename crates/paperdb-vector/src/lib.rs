//! Semantic retrieval: a LanceDB-backed nearest-neighbor store over chunk
//! embeddings, with metadata columns for SQL pre-filter pushdown.

mod index;
pub mod schema;

pub use index::LanceVectorIndex;
