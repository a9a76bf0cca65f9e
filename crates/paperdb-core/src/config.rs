//! Typed configuration, merged from `config.toml` + `config.<env>.toml` +
//! `APP_*` environment variables, with defaults baked in so a bare
//! environment still yields a working engine.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::chunker::ChunkingConfig;
use crate::error::{Result, SearchError};
use crate::types::{FusionPolicy, FusionWeights};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub tantivy_index_dir: String,
    pub lancedb_dir: String,
    pub table_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    /// Each index is asked for `top_k * fetch_multiplier` candidates before
    /// fusion, so a chunk ranked low in one list can still surface.
    pub fetch_multiplier: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    pub policy: FusionPolicy,
    pub weights: FusionWeights,
    /// Smoothing constant for reciprocal-rank fusion; dampens top-rank
    /// volatility.
    pub rrf_c: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionConfig {
    pub enabled: bool,
    /// Queries with fewer tokens than this are considered ambiguous and go
    /// through expansion; longer queries pass through verbatim.
    pub min_tokens: usize,
    /// Max expansion terms added to the query.
    pub budget: usize,
    pub timeout_ms: u64,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "ollama" or "fake" (deterministic, for tests and offline dev).
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub dim: usize,
    pub timeout_ms: u64,
    /// Bounded retry budget for ingestion-time embedding calls.
    pub max_retries: u32,
    pub backoff_ms: u64,
    /// Worker-pool bound for parallel document ingestion, sized to the
    /// embedding service's concurrency limit.
    pub concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub data: DataConfig,
    pub chunking: ChunkingConfig,
    pub search: SearchConfig,
    pub fusion: FusionConfig,
    pub expansion: ExpansionConfig,
    pub embedding: EmbeddingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data: DataConfig {
                tantivy_index_dir: "./data/indexes/tantivy".to_string(),
                lancedb_dir: "./data/indexes/lancedb".to_string(),
                table_name: "chunks".to_string(),
            },
            chunking: ChunkingConfig::default(),
            search: SearchConfig {
                default_limit: 10,
                max_limit: 100,
                fetch_multiplier: 2,
            },
            fusion: FusionConfig {
                policy: FusionPolicy::WeightedMinMax,
                weights: FusionWeights::default(),
                rrf_c: 60.0,
            },
            expansion: ExpansionConfig {
                enabled: true,
                min_tokens: 3,
                budget: 5,
                timeout_ms: 2_000,
                model: "gemma2".to_string(),
            },
            embedding: EmbeddingConfig {
                provider: "ollama".to_string(),
                base_url: "http://127.0.0.1:11434".to_string(),
                model: "nomic-embed-text".to_string(),
                dim: 768,
                timeout_ms: 10_000,
                max_retries: 3,
                backoff_ms: 250,
                concurrency: 4,
            },
        }
    }
}

impl EngineConfig {
    /// Merge defaults, `config.toml`, the `RUST_ENV`-selected overlay and
    /// `APP_*` env vars (nested keys separated by `__`).
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config: EngineConfig = figment
            .extract()
            .map_err(|e| SearchError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.fusion.weights.validate()?;
        if self.search.default_limit == 0 || self.search.default_limit > self.search.max_limit {
            return Err(SearchError::InvalidConfig(format!(
                "search.default_limit ({}) must be in 1..=max_limit ({})",
                self.search.default_limit, self.search.max_limit
            )));
        }
        if self.search.fetch_multiplier == 0 {
            return Err(SearchError::InvalidConfig(
                "search.fetch_multiplier must be > 0".to_string(),
            ));
        }
        if self.fusion.rrf_c < 0.0 {
            return Err(SearchError::InvalidConfig(
                "fusion.rrf_c must be non-negative".to_string(),
            ));
        }
        if self.embedding.dim == 0 {
            return Err(SearchError::InvalidConfig(
                "embedding.dim must be > 0".to_string(),
            ));
        }
        if self.embedding.concurrency == 0 {
            return Err(SearchError::InvalidConfig(
                "embedding.concurrency must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tantivy_index_dir(&self) -> PathBuf {
        expand_path(&self.data.tantivy_index_dir)
    }

    pub fn lancedb_dir(&self) -> PathBuf {
        expand_path(&self.data.lancedb_dir)
    }
}

/// Expand a user-provided path string: `~` to the home directory, `${VAR}`
/// and `$VAR` environment variables. No canonicalization.
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().expect("default config is valid");
        assert_eq!(config.fusion.weights.semantic, 0.5);
        assert_eq!(config.fusion.rrf_c, 60.0);
        assert_eq!(config.expansion.min_tokens, 3);
    }

    #[test]
    fn bad_overlap_is_rejected() {
        let mut config = EngineConfig::default();
        config.chunking.overlap = config.chunking.size;
        assert!(matches!(
            config.validate(),
            Err(SearchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn bad_weights_are_rejected() {
        let mut config = EngineConfig::default();
        config.fusion.weights.semantic = 0.9;
        config.fusion.weights.lexical = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn expand_path_handles_tilde() {
        let p = expand_path("~/indexes");
        assert!(!p.to_string_lossy().starts_with('~'));
    }
}
