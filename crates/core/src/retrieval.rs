//! Retriever trait: query in, ranked text chunks out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A retrieved passage of knowledge-base text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return up to `k` chunks ranked by relevance. May be empty.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Chunk>, StoreError>;
}

const CHUNK_SEPARATOR: &str = "----------------------------------------";

/// Render chunks for inclusion in a prompt or tool result.
pub fn format_chunks(chunks: &[Chunk]) -> String {
    let meta = |chunk: &Chunk, key: &str| {
        chunk
            .metadata
            .get(key)
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default()
    };

    chunks
        .iter()
        .map(|chunk| {
            format!(
                "ID: {}\nName: {}\nLast Updated: {}\nContent: {}\n{CHUNK_SEPARATOR}\n",
                chunk.id,
                meta(chunk, "name"),
                meta(chunk, "last_updated"),
                chunk.text.trim()
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn format_includes_metadata() {
        let mut metadata = serde_json::Map::new();
        metadata.insert("name".into(), json!("PSLF overview"));
        metadata.insert("last_updated".into(), json!("2025-01-01"));
        let chunks = vec![Chunk {
            id: "c1".into(),
            text: "  Public Service Loan Forgiveness...  ".into(),
            metadata,
        }];
        let out = format_chunks(&chunks);
        assert!(out.starts_with("ID: c1\nName: PSLF overview\nLast Updated: 2025-01-01\n"));
        assert!(out.contains("Content: Public Service Loan Forgiveness...\n"));
        assert!(out.trim_end().ends_with(CHUNK_SEPARATOR));
    }

    #[test]
    fn format_empty() {
        assert_eq!(format_chunks(&[]), "");
    }
}
