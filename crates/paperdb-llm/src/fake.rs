//! Deterministic stand-ins for the Ollama services. Same trait contracts,
//! no network, stable output for a given input.

use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use twox_hash::XxHash64;

use paperdb_core::error::Result;
use paperdb_core::traits::{Embedder, QueryExpander};

use crate::ollama::merge_terms;

/// Hashes word tokens into a fixed-dimension unit vector. Identical texts
/// embed identically; texts sharing tokens land near each other, which is
/// enough signal for end-to-end retrieval tests.
pub struct FakeEmbedder {
    dim: usize,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }
}

/// Appends a fixed term list to every query, within budget.
pub struct FakeExpander {
    terms: Vec<String>,
}

impl FakeExpander {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { terms: terms.into_iter().map(Into::into).collect() }
    }
}

#[async_trait]
impl QueryExpander for FakeExpander {
    async fn expand(&self, query: &str, budget: usize) -> Result<String> {
        Ok(merge_terms(query, &self.terms.join(" "), budget))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_embedder_is_deterministic_and_normalized() {
        let embedder = FakeEmbedder::new(64);
        let a = embedder.embed("deep learning").await.expect("embeds");
        let b = embedder.embed("deep learning").await.expect("embeds");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn fake_embedder_separates_disjoint_texts() {
        let embedder = FakeEmbedder::new(64);
        let a = embedder.embed("convolutional networks").await.expect("embeds");
        let b = embedder.embed("protein folding").await.expect("embeds");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn fake_expander_honors_budget_and_skips_duplicates() {
        let expander = FakeExpander::new(["transformer", "attention", "bert"]);
        let out = expander.expand("attention models", 1).await.expect("expands");
        assert_eq!(out, "attention models transformer");
    }
}
