//! Clients for the external ML services: embedding and query expansion
//! over the Ollama HTTP API, plus deterministic fakes for tests and
//! offline development.

mod fake;
mod ollama;

pub use fake::{FakeEmbedder, FakeExpander};
pub use ollama::{OllamaEmbedder, OllamaExpander};

use std::sync::Arc;

use paperdb_core::config::EmbeddingConfig;
use paperdb_core::error::{Result, SearchError};
use paperdb_core::traits::Embedder;

/// Build the embedder named by `provider` in the config.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "fake" => Ok(Arc::new(FakeEmbedder::new(config.dim))),
        other => Err(SearchError::InvalidConfig(format!(
            "unknown embedding provider '{other}' (expected 'ollama' or 'fake')"
        ))),
    }
}
