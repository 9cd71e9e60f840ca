//! Reply to a blocked message.

use finassist_config::GuardrailConfig;
use finassist_core::event::{EventSink, TurnEvent};
use finassist_core::message::Message;
use finassist_core::provider::BoundModel;
use finassist_core::state::{ConversationState, StateUpdate};
use finassist_guardrails::extract_context;
use tracing::warn;

use crate::prompt::{FALLBACK_SAFE_RESPONSE, SAFE_RESPONSE_ROLE, safe_response_prompt};

pub struct SafeResponder {
    model: BoundModel,
    context_user_turns: usize,
}

impl SafeResponder {
    pub fn new(model: BoundModel) -> Self {
        Self::from_config(model, &GuardrailConfig::default())
    }

    pub fn from_config(model: BoundModel, config: &GuardrailConfig) -> Self {
        Self {
            model,
            context_user_turns: config.context_user_turns,
        }
    }

    /// Always appends exactly one assistant message and nothing else.
    pub async fn run(&self, state: &ConversationState, events: &EventSink) -> StateUpdate {
        let (flagged, context) = extract_context(&state.messages, self.context_user_turns);
        let reasoning = state
            .guardrail_assessment
            .as_ref()
            .map(|a| a.reasoning.as_str())
            .filter(|r| !r.is_empty())
            .unwrap_or("No specific reason provided");

        let prompt = safe_response_prompt(&flagged, &context, reasoning);
        let reply = match self.model.prompt(SAFE_RESPONSE_ROLE, &prompt).await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => {
                warn!(thread_id = %state.thread_id, "Safe-response model returned nothing, using fallback");
                FALLBACK_SAFE_RESPONSE.to_string()
            }
            Err(e) => {
                warn!(thread_id = %state.thread_id, error = %e, "Safe-response model failed, using fallback");
                FALLBACK_SAFE_RESPONSE.to_string()
            }
        };

        events.emit(TurnEvent::TextDelta { content: reply.clone() }).await;
        StateUpdate::new().with_message(Message::assistant(reply))
    }
}
