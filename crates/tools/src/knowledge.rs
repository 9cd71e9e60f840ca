//! `query_knowledgebase`: retrieval the model can ask for mid-turn.

use async_trait::async_trait;
use finassist_core::error::ToolError;
use finassist_core::message::Message;
use finassist_core::retrieval::{Retriever, format_chunks};
use finassist_core::state::{References, StateUpdate};
use finassist_core::tool::{Tool, ToolContext, ToolOutput};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::format::{failed, parse_args};

const DEFAULT_K: usize = 5;
const MAX_K: usize = 20;

#[derive(Debug, Deserialize)]
struct QueryArgs {
    query: String,
    #[serde(default)]
    k: Option<usize>,
}

pub struct QueryKnowledgebaseTool {
    retriever: Arc<dyn Retriever>,
}

impl QueryKnowledgebaseTool {
    const NAME: &'static str = "query_knowledgebase";

    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl Tool for QueryKnowledgebaseTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Search the student loan knowledge base (repayment plans, forgiveness programs, \
         consolidation, refinancing) and return the most relevant passages."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "k": {
                    "type": "integer",
                    "description": "Number of passages to return (default 5)",
                    "default": DEFAULT_K
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext<'_>,
    ) -> Result<ToolOutput, ToolError> {
        let args: QueryArgs = parse_args(arguments)?;
        if args.query.trim().is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".into()));
        }
        let k = args.k.unwrap_or(DEFAULT_K).clamp(1, MAX_K);

        let chunks = self.retriever.retrieve(&args.query, k).await.map_err(|e| {
            warn!(tool = Self::NAME, error = %e, "Knowledge base retrieval failed");
            failed(Self::NAME, "Knowledge base is unavailable")
        })?;
        debug!(tool = Self::NAME, count = chunks.len(), "Knowledge base queried");

        let content = format!(
            "Retrieved {} chunks from the knowledgebase: \n{}",
            chunks.len(),
            format_chunks(&chunks)
        );
        Ok(ToolOutput::Update(
            StateUpdate::new()
                .with_message(Message::tool_result(ctx.call_id, Self::NAME, content))
                .with_references(References {
                    perform_rag: true,
                    rag_query: args.query,
                    retrieved_chunks: chunks,
                }),
        ))
    }
}
