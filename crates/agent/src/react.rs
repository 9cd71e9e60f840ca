//! ReAct engine: the bounded reason ↔ act cycle.
//!
//! `reason` asks the reasoning model for the next step given the bound tool
//! subset and the redacted history. `act` runs whatever tools the model
//! requested against the full registry. The two strictly alternate until the
//! model answers without tools or the iteration cap is hit.
//!
//! # Continuation rule
//!
//! Evaluated after every `reason`, cap first:
//!
//! 1. `react_loop_iterations >= max_react_loops`: stop, reset the counter,
//!    keep the message only if it has text and no tool calls.
//! 2. The message requests tools: go to `act`, increment the counter.
//! 3. Otherwise: stop, reset the counter, keep the message if it has text.

use std::sync::Arc;

use finassist_core::error::{ProviderError, ToolError};
use finassist_core::event::{EventSink, TurnEvent};
use finassist_core::message::{Message, MessageToolCall};
use finassist_core::provider::BoundModel;
use finassist_core::state::{ConversationState, StateUpdate};
use finassist_core::tool::{ToolCall, ToolContext, ToolOutput, ToolRegistry};
use tracing::{debug, info, warn};

use crate::binder::{DefaultBinder, ToolBinder};
use crate::prompt::{PromptBuilder, StudentDebtPrompt};
use crate::redaction::redact;

pub const DEFAULT_MAX_REACT_LOOPS: u32 = 6;

/// Where the loop goes after a `reason` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Act,
    End,
}

pub struct ReactEngine {
    model: BoundModel,
    tools: Arc<ToolRegistry>,
    binder: Arc<dyn ToolBinder>,
    prompt: Arc<dyn PromptBuilder>,
    max_react_loops: u32,
}

impl ReactEngine {
    /// Create an engine with the default binder and prompt.
    pub fn new(model: BoundModel, tools: Arc<ToolRegistry>) -> Self {
        Self {
            model,
            tools,
            binder: Arc::new(DefaultBinder),
            prompt: Arc::new(StudentDebtPrompt::new()),
            max_react_loops: DEFAULT_MAX_REACT_LOOPS,
        }
    }

    pub fn with_binder(mut self, binder: Arc<dyn ToolBinder>) -> Self {
        self.binder = binder;
        self
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn PromptBuilder>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_max_react_loops(mut self, max: u32) -> Self {
        self.max_react_loops = max;
        self
    }

    pub fn max_react_loops(&self) -> u32 {
        self.max_react_loops
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run the cycle to completion, applying every step to `state`.
    ///
    /// A reasoning-model failure is returned as-is; tool failures never are.
    pub async fn run(&self, state: &mut ConversationState, events: &EventSink) -> Result<(), ProviderError> {
        info!(
            thread_id = %state.thread_id,
            max_react_loops = self.max_react_loops,
            "ReAct loop starting"
        );

        loop {
            let (update, step) = self.reason(state, events).await?;
            state.apply(update);

            match step {
                Step::End => {
                    info!(thread_id = %state.thread_id, "ReAct loop completed");
                    return Ok(());
                }
                Step::Act => {
                    let update = self.act(state, events).await;
                    state.apply(update);
                }
            }
        }
    }

    /// One reasoning step: bind, prompt, call the model, decide.
    pub async fn reason(
        &self,
        state: &ConversationState,
        events: &EventSink,
    ) -> Result<(StateUpdate, Step), ProviderError> {
        let iteration = state.react_loop_iterations;
        let tool_defs = self.binder.definitions(&self.tools, state);
        debug!(
            iteration = iteration + 1,
            bound = tool_defs.len(),
            registered = self.tools.len(),
            "Reason step"
        );

        let mut messages = vec![Message::system(self.prompt.build(state))];
        messages.extend(redact(&state.messages, &state.blocked_message_ids));

        let mut request = self.model.request(messages);
        if !tool_defs.is_empty() {
            request = request.with_tools(tool_defs);
        }
        let response = self.stream_response(request, events).await?;

        Ok(self.decide(iteration, response))
    }

    /// Apply the continuation rule to a fresh model response.
    fn decide(&self, iteration: u32, response: Message) -> (StateUpdate, Step) {
        let keep = !response.content().is_empty() && !response.has_tool_calls();

        if iteration >= self.max_react_loops {
            warn!(max_react_loops = self.max_react_loops, "Max ReAct loops reached, ending loop");
            let mut update = StateUpdate::new().with_iterations(0);
            if keep {
                update = update.with_message(response);
            } else if response.has_tool_calls() {
                debug!(
                    tool_calls = response.tool_calls().len(),
                    "Discarding tool request made at the iteration cap"
                );
            }
            return (update, Step::End);
        }

        if response.has_tool_calls() {
            debug!(tool_calls = response.tool_calls().len(), "Continuing to tool execution");
            let update = StateUpdate::new()
                .with_message(response)
                .with_iterations(iteration + 1);
            return (update, Step::Act);
        }

        let mut update = StateUpdate::new().with_iterations(0);
        if keep {
            update = update.with_message(response);
        } else {
            debug!("Model returned an empty answer, not recording it");
        }
        (update, Step::End)
    }

    /// Stream the model's reply, forwarding text deltas as they arrive.
    async fn stream_response(
        &self,
        request: finassist_core::provider::ProviderRequest,
        events: &EventSink,
    ) -> Result<Message, ProviderError> {
        let mut rx = self.model.provider.stream(request).await?;
        let mut text = String::new();
        let mut tool_calls: Vec<MessageToolCall> = Vec::new();

        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(delta) = chunk.content.filter(|c| !c.is_empty()) {
                events.emit(TurnEvent::TextDelta { content: delta.clone() }).await;
                text.push_str(&delta);
            }
            tool_calls.extend(chunk.tool_calls);
            if chunk.done {
                break;
            }
        }

        Ok(if tool_calls.is_empty() {
            Message::assistant(text)
        } else {
            Message::assistant_with_tool_calls(text, tool_calls)
        })
    }

    /// Execute every tool call requested by the latest message.
    ///
    /// Each failure becomes an error tool message the model can act on.
    pub async fn act(&self, state: &ConversationState, events: &EventSink) -> StateUpdate {
        let calls: Vec<MessageToolCall> = state
            .latest_message()
            .map(|m| m.tool_calls().to_vec())
            .unwrap_or_default();

        let mut update = StateUpdate::new();
        for call in &calls {
            update = update.merge(self.execute_call(call, state, events).await);
        }
        update
    }

    async fn execute_call(
        &self,
        call: &MessageToolCall,
        state: &ConversationState,
        events: &EventSink,
    ) -> StateUpdate {
        events
            .emit(TurnEvent::ToolCall {
                id: call.id.clone(),
                name: call.name.clone(),
            })
            .await;

        let result = match self.parse_call(call) {
            Ok(tool_call) => {
                let ctx = ToolContext {
                    call_id: &call.id,
                    state,
                    events,
                };
                self.tools.execute(&tool_call, &ctx).await
            }
            Err(e) => Err(e),
        };

        let success = result.is_ok();
        let update = match result {
            Ok(ToolOutput::Text(content)) => {
                StateUpdate::new().with_message(Message::tool_result(&call.id, &call.name, content))
            }
            Ok(ToolOutput::Update(mut patch)) => {
                let answered = patch
                    .messages
                    .iter()
                    .any(|m| matches!(m, Message::Tool { tool_call_id, .. } if *tool_call_id == call.id));
                if !answered {
                    patch.messages.push(Message::tool_result(
                        &call.id,
                        &call.name,
                        format!("Tool {} completed.", call.name),
                    ));
                }
                patch
            }
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool execution failed");
                StateUpdate::new().with_message(Message::tool_result(
                    &call.id,
                    &call.name,
                    format!(
                        "Error: {}. Please fix your mistakes or ask the user to rephrase.",
                        self.error_reason(&e)
                    ),
                ))
            }
        };

        events
            .emit(TurnEvent::ToolResult {
                id: call.id.clone(),
                name: call.name.clone(),
                success,
            })
            .await;
        debug!(tool = %call.name, success, "Tool call finished");
        update
    }

    fn parse_call(&self, call: &MessageToolCall) -> Result<ToolCall, ToolError> {
        let arguments = if call.arguments.trim().is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&call.arguments)
                .map_err(|e| ToolError::InvalidArguments(format!("arguments are not valid JSON ({e})")))?
        };
        Ok(ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments,
        })
    }

    fn error_reason(&self, error: &ToolError) -> String {
        match error {
            ToolError::NotFound(name) => format!(
                "{name} is not a valid tool, try one of [{}]",
                self.tools.names().join(", ")
            ),
            ToolError::InvalidArguments(detail) => format!("Invalid arguments: {detail}"),
            ToolError::ExecutionFailed { reason, .. } => reason.clone(),
        }
    }
}
