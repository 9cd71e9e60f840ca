//! Built-in tool implementations for FinAssist.
//!
//! Tools give the reasoning model the ability to compute and to render:
//! amortize a loan, solve for a missing loan parameter, show a chart, ask
//! for the user's loan data, recommend a product and search the knowledge
//! base.

pub mod amortization;
pub mod chart;
pub mod format;
pub mod knowledge;
pub mod recommend;
pub mod upload;

use finassist_core::retrieval::Retriever;
use finassist_core::tool::ToolRegistry;
use std::sync::Arc;

pub use amortization::{GenerateAmortizationTool, SolveLoanParameterTool};
pub use chart::SendUserVisualTool;
pub use knowledge::QueryKnowledgebaseTool;
pub use recommend::RecommendProductTool;
pub use upload::UploadStudentDataTool;

/// Create the registry of all built-in tools.
///
/// `query_knowledgebase` is only registered when a retriever is available.
pub fn default_registry(retriever: Option<Arc<dyn Retriever>>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(GenerateAmortizationTool));
    registry.register(Box::new(SolveLoanParameterTool));
    registry.register(Box::new(SendUserVisualTool));
    registry.register(Box::new(UploadStudentDataTool));
    registry.register(Box::new(RecommendProductTool));
    if let Some(retriever) = retriever {
        registry.register(Box::new(QueryKnowledgebaseTool::new(retriever)));
    }
    registry
}
