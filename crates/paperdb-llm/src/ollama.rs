//! Ollama HTTP clients. Both services speak plain JSON over a local
//! endpoint; request timeouts map to the `*Timeout` error variants so the
//! orchestrator can tell a slow service from a missing one.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use paperdb_core::config::{EmbeddingConfig, ExpansionConfig};
use paperdb_core::error::{Result, SearchError};
use paperdb_core::traits::{Embedder, QueryExpander};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: i32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Embedding client for Ollama's `/api/embed` batch endpoint.
pub struct OllamaEmbedder {
    http: reqwest::Client,
    base_url: String,
    model: String,
    dim: usize,
    timeout: Duration,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dim: config.dim,
            timeout,
        })
    }

    fn classify(&self, e: reqwest::Error) -> SearchError {
        if e.is_timeout() {
            SearchError::EmbeddingTimeout(self.timeout)
        } else {
            SearchError::EmbeddingUnavailable(e.to_string())
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        batch
            .pop()
            .ok_or_else(|| SearchError::EmbeddingUnavailable("empty response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/api/embed", self.base_url);
        let request = EmbedRequest { model: &self.model, input: texts };
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::EmbeddingUnavailable(format!(
                "ollama returned {status}: {body}"
            )));
        }
        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| SearchError::EmbeddingUnavailable(format!("bad response body: {e}")))?;
        if parsed.embeddings.len() != texts.len() {
            return Err(SearchError::EmbeddingUnavailable(format!(
                "requested {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }
        for v in &parsed.embeddings {
            if v.len() != self.dim {
                return Err(SearchError::EmbeddingUnavailable(format!(
                    "model '{}' returned dimension {}, configured {}",
                    self.model,
                    v.len(),
                    self.dim
                )));
            }
        }
        debug!(count = texts.len(), model = %self.model, "embedded batch");
        Ok(parsed.embeddings)
    }
}

/// Query-expansion client for Ollama's `/api/generate` endpoint.
///
/// The model is asked for related terms only; whatever it returns is
/// tokenized and merged with the original query, so a chatty model still
/// yields a usable term set.
pub struct OllamaExpander {
    http: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaExpander {
    pub fn new(base_url: &str, config: &ExpansionConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout,
        })
    }

    fn prompt(query: &str, budget: usize) -> String {
        format!(
            "Given the search query: \"{query}\"\n\
             Generate up to {budget} related terms or synonyms that would help \
             find relevant scientific papers.\n\
             Return only the terms separated by spaces, no explanation.\n\n\
             Query: {query}\nExpanded terms:"
        )
    }

    fn classify(&self, e: reqwest::Error) -> SearchError {
        if e.is_timeout() {
            SearchError::ExpansionTimeout(self.timeout)
        } else {
            SearchError::ExpansionUnavailable(e.to_string())
        }
    }
}

#[async_trait]
impl QueryExpander for OllamaExpander {
    async fn expand(&self, query: &str, budget: usize) -> Result<String> {
        if budget == 0 {
            return Ok(query.to_string());
        }
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt: &Self::prompt(query, budget),
            stream: false,
            options: GenerateOptions { temperature: 0.0, num_predict: 64 },
        };
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(SearchError::ExpansionUnavailable(format!(
                "ollama returned {status}"
            )));
        }
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| SearchError::ExpansionUnavailable(format!("bad response body: {e}")))?;
        let merged = merge_terms(query, &parsed.response, budget);
        if merged == query {
            warn!(model = %self.model, "expansion produced no new terms");
        }
        Ok(merged)
    }
}

/// Append up to `budget` new lowercase word tokens from `generated` to the
/// original query. Original text is kept verbatim and first; duplicates
/// (case-insensitive) are dropped.
pub(crate) fn merge_terms(query: &str, generated: &str, budget: usize) -> String {
    let seen: HashSet<String> = word_tokens(query).collect();
    let mut merged = query.to_string();
    let mut added = HashSet::new();
    for term in word_tokens(generated) {
        if added.len() >= budget {
            break;
        }
        if seen.contains(&term) || !added.insert(term.clone()) {
            continue;
        }
        merged.push(' ');
        merged.push_str(&term);
    }
    merged
}

fn word_tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_original_first_and_deduplicates() {
        let merged = merge_terms("neural networks", "Neural nets deep learning", 5);
        assert_eq!(merged, "neural networks nets deep learning");
    }

    #[test]
    fn merge_respects_budget() {
        let merged = merge_terms("bert", "roberta albert electra deberta", 2);
        assert_eq!(merged, "bert roberta albert");
    }

    #[test]
    fn merge_strips_model_punctuation() {
        let merged = merge_terms("gan", "1. adversarial, 2. generative.", 5);
        assert_eq!(merged, "gan 1 adversarial 2 generative");
    }

    #[test]
    fn embed_request_wire_format() {
        let input = vec!["a".to_string(), "b".to_string()];
        let req = EmbedRequest { model: "nomic-embed-text", input: &input };
        let json = serde_json::to_value(&req).expect("serializes");
        assert_eq!(json["model"], "nomic-embed-text");
        assert_eq!(json["input"].as_array().expect("array").len(), 2);
    }

    #[test]
    fn generate_request_is_not_streaming() {
        let req = GenerateRequest {
            model: "gemma2",
            prompt: "p",
            stream: false,
            options: GenerateOptions { temperature: 0.0, num_predict: 64 },
        };
        let json = serde_json::to_value(&req).expect("serializes");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 64);
    }
}
