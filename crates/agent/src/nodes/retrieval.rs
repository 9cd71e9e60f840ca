//! Entry retrieval: decide up front whether the knowledge base is needed and
//! fetch passages for the system prompt.

use std::sync::Arc;

use finassist_core::provider::BoundModel;
use finassist_core::retrieval::Retriever;
use finassist_core::state::{ConversationState, References, StateUpdate};
use finassist_guardrails::parse_json;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::prompt::ENTRY_RETRIEVAL_PROMPT;

pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Deserialize)]
struct RetrievalDecision {
    perform_rag: bool,
    #[serde(default)]
    rag_query: String,
}

pub struct EntryRetrieval {
    model: BoundModel,
    retriever: Option<Arc<dyn Retriever>>,
    top_k: usize,
}

impl EntryRetrieval {
    pub fn new(model: BoundModel) -> Self {
        Self {
            model,
            retriever: None,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>, top_k: usize) -> Self {
        self.retriever = Some(retriever);
        self.top_k = top_k;
        self
    }

    /// Touches only `references`. Never fails: any problem yields
    /// [`References::empty`].
    pub async fn run(&self, state: &ConversationState) -> StateUpdate {
        let references = match &self.retriever {
            None => References::empty(),
            Some(retriever) => match self.retrieve(retriever.as_ref(), state).await {
                Ok(references) => references,
                Err(e) => {
                    warn!(thread_id = %state.thread_id, error = %e, "Entry retrieval failed");
                    References::empty()
                }
            },
        };
        StateUpdate::new().with_references(references)
    }

    async fn retrieve(
        &self,
        retriever: &dyn Retriever,
        state: &ConversationState,
    ) -> Result<References, finassist_core::Error> {
        let latest = state.latest_message().map(|m| m.text()).unwrap_or_default();
        let raw = self.model.prompt(ENTRY_RETRIEVAL_PROMPT, &latest).await?;
        let decision: RetrievalDecision = parse_json(&raw)?;

        if !decision.perform_rag {
            debug!(thread_id = %state.thread_id, "Entry retrieval not needed");
            return Ok(References::empty());
        }

        let query = if decision.rag_query.trim().is_empty() {
            latest
        } else {
            decision.rag_query
        };
        let chunks = retriever.retrieve(&query, self.top_k).await?;
        debug!(thread_id = %state.thread_id, count = chunks.len(), "Entry retrieval complete");

        Ok(References {
            perform_rag: true,
            rag_query: query,
            retrieved_chunks: chunks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FailingProvider, SequentialMockProvider, make_text_response};
    use finassist_core::message::Message;
    use finassist_core::retrieval::Chunk;
    use finassist_core::state::UserProfile;
    use finassist_store::knowledge::KeywordRetriever;

    fn retriever() -> Arc<dyn Retriever> {
        Arc::new(KeywordRetriever::new(vec![Chunk {
            id: "kb-1".into(),
            text: "PSLF forgives remaining balances after 120 qualifying payments.".into(),
            metadata: serde_json::Map::new(),
        }]))
    }

    fn state(text: &str) -> ConversationState {
        let mut state = ConversationState::new("t", "u", UserProfile::default());
        state.apply(StateUpdate::new().with_message(Message::user(text)));
        state
    }

    #[tokio::test]
    async fn no_retriever_skips_model() {
        let provider = Arc::new(FailingProvider::network());
        let node = EntryRetrieval::new(BoundModel::new(provider.clone(), "fast"));
        let update = node.run(&state("what is PSLF?")).await;
        assert_eq!(update.references, Some(References::empty()));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_query_falls_back_to_message() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response(
            "```json\n{\"perform_rag\": true, \"rag_query\": \"\"}\n```",
        )]));
        let node = EntryRetrieval::new(BoundModel::new(provider, "fast")).with_retriever(retriever(), 5);

        let references = node.run(&state("How does PSLF work?")).await.references.unwrap();
        assert!(references.perform_rag);
        assert_eq!(references.rag_query, "How does PSLF work?");
        assert_eq!(references.retrieved_chunks[0].id, "kb-1");
    }

    #[tokio::test]
    async fn declined_retrieval_is_empty() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response(
            r#"{"perform_rag": false, "rag_query": ""}"#,
        )]));
        let node = EntryRetrieval::new(BoundModel::new(provider, "fast")).with_retriever(retriever(), 5);
        assert_eq!(node.run(&state("thanks!")).await.references, Some(References::empty()));
    }

    #[tokio::test]
    async fn model_failure_is_empty() {
        let node = EntryRetrieval::new(BoundModel::new(Arc::new(FailingProvider::network()), "fast"))
            .with_retriever(retriever(), 5);
        assert_eq!(node.run(&state("PSLF?")).await.references, Some(References::empty()));

        let provider = Arc::new(SequentialMockProvider::single_text("no idea"));
        let node = EntryRetrieval::new(BoundModel::new(provider, "fast")).with_retriever(retriever(), 5);
        assert_eq!(node.run(&state("PSLF?")).await.references, Some(References::empty()));
    }
}
