//! The per-turn graph.
//!
//! ```text
//! START ─┬─ initialize ──────┐
//!        ├─ guardrail gate ──┼─ merge ─ router ─┬─ safe response ─ END
//!        └─ entry retrieval ─┘                  └─ react loop ───── END
//! ```
//!
//! The three entry nodes see the same snapshot and write disjoint fields, so
//! they run concurrently and their updates are merged before routing.

use std::sync::Arc;

use finassist_config::AppConfig;
use finassist_core::error::ProviderError;
use finassist_core::event::{EventSink, TurnEvent};
use finassist_core::retrieval::Retriever;
use finassist_core::state::ConversationState;
use finassist_core::store::ThreadStore;
use finassist_core::tool::ToolRegistry;
use finassist_guardrails::Gate;
use finassist_providers::ModelSet;
use tracing::{debug, info};

use crate::nodes::{EntryRetrieval, Initialize, Route, SafeResponder, route};
use crate::react::ReactEngine;

pub struct TurnGraph {
    initialize: Initialize,
    gate: Gate,
    retrieval: EntryRetrieval,
    safe_response: SafeResponder,
    engine: ReactEngine,
}

impl TurnGraph {
    /// Graph with default node settings and no entry retrieval.
    pub fn new(models: &ModelSet, tools: Arc<ToolRegistry>, threads: Arc<dyn ThreadStore>) -> Self {
        Self {
            initialize: Initialize::new(threads),
            gate: Gate::new(models.guardrail.clone()),
            retrieval: EntryRetrieval::new(models.fast.clone()),
            safe_response: SafeResponder::new(models.safe_response.clone()),
            engine: ReactEngine::new(models.reasoning.clone(), tools),
        }
    }

    /// Graph wired from configuration. The knowledge-base tool and entry
    /// retrieval are enabled only when a retriever is supplied.
    pub fn from_config(
        config: &AppConfig,
        models: &ModelSet,
        threads: Arc<dyn ThreadStore>,
        retriever: Option<Arc<dyn Retriever>>,
    ) -> Self {
        let tools = Arc::new(finassist_tools::default_registry(retriever.clone()));

        let mut retrieval = EntryRetrieval::new(models.fast.clone());
        if let Some(retriever) = retriever {
            retrieval = retrieval.with_retriever(retriever, config.retrieval.top_k);
        }

        Self {
            initialize: Initialize::new(threads),
            gate: Gate::from_config(models.guardrail.clone(), &config.guardrail),
            retrieval,
            safe_response: SafeResponder::from_config(models.safe_response.clone(), &config.guardrail),
            engine: ReactEngine::new(models.reasoning.clone(), tools)
                .with_max_react_loops(config.agent.max_react_loops),
        }
    }

    pub fn with_engine(mut self, engine: ReactEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_retrieval(mut self, retrieval: EntryRetrieval) -> Self {
        self.retrieval = retrieval;
        self
    }

    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = gate;
        self
    }

    pub fn engine(&self) -> &ReactEngine {
        &self.engine
    }

    /// Run one turn over `state`, whose latest message is the new user input.
    ///
    /// Returns the branch taken. Only a reasoning-model failure is an error;
    /// every other failure is absorbed by the node it happens in.
    pub async fn run(&self, state: &mut ConversationState, events: &EventSink) -> Result<Route, ProviderError> {
        state.begin_turn();

        let (init, gate, references) = tokio::join!(
            self.initialize.run(state),
            self.gate.validate(&state.messages, &state.blocked_message_ids),
            self.retrieval.run(state),
        );
        state.apply(init.merge(gate.into_update()).merge(references));

        events
            .emit(TurnEvent::StateSnapshot {
                state: Box::new(state.clone()),
            })
            .await;

        let next = route(state.guardrail_assessment.as_ref());
        debug!(thread_id = %state.thread_id, route = ?next, "Routing turn");

        match next {
            Route::SafeResponse => {
                info!(thread_id = %state.thread_id, "Input blocked, sending safe response");
                let update = self.safe_response.run(state, events).await;
                state.apply(update);
            }
            Route::React => self.engine.run(state, events).await?,
        }

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{SequentialMockProvider, make_text_response, make_verdict};
    use finassist_core::message::{Message, Role};
    use finassist_core::provider::BoundModel;
    use finassist_core::state::{StateUpdate, UserProfile};
    use finassist_store::InMemoryStore;

    fn models(
        reasoning: Arc<SequentialMockProvider>,
        guardrail: Arc<SequentialMockProvider>,
        safe: Arc<SequentialMockProvider>,
    ) -> ModelSet {
        ModelSet {
            reasoning: BoundModel::new(reasoning, "reasoning"),
            guardrail: BoundModel::new(guardrail, "guardrail"),
            safe_response: BoundModel::new(safe, "safe"),
            fast: BoundModel::new(Arc::new(SequentialMockProvider::new(vec![])), "fast"),
        }
    }

    fn state_with(text: &str) -> ConversationState {
        let mut state = ConversationState::new("t1", "u1", UserProfile::default());
        state.apply(StateUpdate::new().with_message(Message::user(text)));
        state
    }

    #[tokio::test]
    async fn allowed_input_reaches_react() {
        let reasoning = Arc::new(SequentialMockProvider::single_text("PSLF needs 120 payments."));
        let guardrail = Arc::new(SequentialMockProvider::new(vec![make_verdict(false, "on topic")]));
        let safe = Arc::new(SequentialMockProvider::new(vec![]));
        let graph = TurnGraph::new(
            &models(reasoning.clone(), guardrail, safe.clone()),
            Arc::new(ToolRegistry::new()),
            Arc::new(InMemoryStore::new()),
        );

        let mut state = state_with("How does PSLF work?");
        let taken = graph.run(&mut state, &EventSink::none()).await.unwrap();

        assert_eq!(taken, Route::React);
        assert_eq!(reasoning.call_count(), 1);
        assert_eq!(safe.call_count(), 0);
        assert_eq!(state.messages.last().unwrap().role(), Role::Assistant);
        assert!(state.blocked_message_ids.is_empty());
    }

    #[tokio::test]
    async fn blocked_input_takes_safe_branch() {
        let reasoning = Arc::new(SequentialMockProvider::new(vec![]));
        let guardrail = Arc::new(SequentialMockProvider::new(vec![make_verdict(true, "off topic")]));
        let safe = Arc::new(SequentialMockProvider::new(vec![make_text_response(
            "I can only help with student loans.",
        )]));
        let graph = TurnGraph::new(
            &models(reasoning.clone(), guardrail, safe),
            Arc::new(ToolRegistry::new()),
            Arc::new(InMemoryStore::new()),
        );

        let mut state = state_with("tell me a joke");
        let user_id = state.messages[0].id().unwrap().to_string();
        let taken = graph.run(&mut state, &EventSink::none()).await.unwrap();

        assert_eq!(taken, Route::SafeResponse);
        assert_eq!(reasoning.call_count(), 0);
        assert!(state.blocked_message_ids.contains(&user_id));
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.react_loop_iterations, 0);
    }

    #[tokio::test]
    async fn stale_assessment_is_cleared() {
        let reasoning = Arc::new(SequentialMockProvider::single_text("Sure."));
        let guardrail = Arc::new(SequentialMockProvider::new(vec![make_verdict(false, "fine")]));
        let safe = Arc::new(SequentialMockProvider::new(vec![]));
        let graph = TurnGraph::new(
            &models(reasoning, guardrail, safe),
            Arc::new(ToolRegistry::new()),
            Arc::new(InMemoryStore::new()),
        );

        let mut state = state_with("What about IDR?");
        state.guardrail_assessment = Some(finassist_core::state::ValidationResult::blocked("old"));
        assert_eq!(graph.run(&mut state, &EventSink::none()).await.unwrap(), Route::React);
        assert!(!state.guardrail_assessment.unwrap().blocked);
    }
}
