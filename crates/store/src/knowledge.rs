//! Keyword knowledge-base retriever over a JSONL file of chunks.
//!
//! Each line is a [`Chunk`]: `{"id": ..., "text": ..., "metadata": {...}}`.
//! Scoring counts query-term occurrences, normalised by chunk length.

use async_trait::async_trait;
use finassist_core::error::StoreError;
use finassist_core::retrieval::{Chunk, Retriever};
use std::path::Path;
use tracing::{debug, warn};

const MIN_TERM_LEN: usize = 3;

pub struct KeywordRetriever {
    chunks: Vec<Chunk>,
}

impl KeywordRetriever {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    /// Load chunks from a JSONL file. Corrupted lines are skipped.
    pub fn from_jsonl(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Storage(format!("Failed to read knowledge base {}: {e}", path.display()))
        })?;

        let chunks: Vec<Chunk> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<Chunk>(line) {
                Ok(chunk) => Some(chunk),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted knowledge-base chunk");
                    None
                }
            })
            .collect();

        debug!(path = %path.display(), count = chunks.len(), "Knowledge base loaded");
        Ok(Self::new(chunks))
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn score(chunk: &Chunk, terms: &[String]) -> f32 {
        let text = chunk.text.to_lowercase();
        let occurrences: usize = terms.iter().map(|t| text.matches(t.as_str()).count()).sum();
        occurrences as f32 / (text.len() as f32 / 100.0).max(1.0)
    }
}

fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TERM_LEN)
        .map(str::to_lowercase)
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

#[async_trait]
impl Retriever for KeywordRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Chunk>, StoreError> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, &Chunk)> = self
            .chunks
            .iter()
            .map(|c| (Self::score(c, &terms), c))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored.into_iter().take(k).map(|(_, c)| c.clone()).collect())
    }
}
