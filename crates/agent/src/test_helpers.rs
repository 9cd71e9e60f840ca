//! Scripted providers for deterministic tests.
//!
//! Used by this crate's unit tests and by the integration tests under
//! `tests/`.

use async_trait::async_trait;
use finassist_core::error::ProviderError;
use finassist_core::message::{Message, MessageToolCall};
use finassist_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A mock provider that returns a sequence of scripted results.
///
/// Each call to `complete` pops the next result. Running out of script is
/// reported as an API error so a test sees it as a failed turn.
pub struct SequentialMockProvider {
    script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    /// Script successes and failures in order.
    pub fn with_results(results: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider that returns a single text response.
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// A provider that first requests tools, then answers.
    pub fn tool_then_answer(tool_calls: Vec<MessageToolCall>, thought: &str, answer: &str) -> Self {
        Self::new(vec![
            make_tool_call_response(tool_calls, thought),
            make_text_response(answer),
        ])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self
                .requests
                .lock()
                .map_err(|_| ProviderError::NotConfigured("mock state poisoned".into()))?;
            requests.push(request);
            requests.len()
        };

        let next = self
            .script
            .lock()
            .map_err(|_| ProviderError::NotConfigured("mock state poisoned".into()))?
            .pop_front();

        next.unwrap_or_else(|| {
            Err(ProviderError::ApiError {
                status_code: 500,
                message: format!("SequentialMockProvider: no scripted response for call #{call}"),
            })
        })
    }
}

/// A provider whose every call fails with the same error.
pub struct FailingProvider {
    error: ProviderError,
    calls: Mutex<usize>,
}

impl FailingProvider {
    pub fn new(error: ProviderError) -> Self {
        Self {
            error,
            calls: Mutex::new(0),
        }
    }

    pub fn network() -> Self {
        Self::new(ProviderError::Network("connection reset by peer".into()))
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| *c).unwrap_or_default()
    }
}

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        Err(self.error.clone())
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_tool_calls(thought, tool_calls),
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// Helper to create a tool call with id `call_<name>`.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    make_tool_call_with_id(&format!("call_{name}"), name, args)
}

pub fn make_tool_call_with_id(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: args.to_string(),
    }
}

/// A guardrail verdict as the guardrail model would print it.
pub fn make_verdict(blocked: bool, reasoning: &str) -> ProviderResponse {
    make_text_response(
        &serde_json::json!({
            "reasoning": reasoning,
            "blocked": blocked,
        })
        .to_string(),
    )
}
