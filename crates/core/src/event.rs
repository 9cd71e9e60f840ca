//! Turn events: the observable effects of a running turn.
//!
//! Nodes and tools emit [`TurnEvent`]s through an [`EventSink`]. Transport
//! (SSE, WebSocket, terminal) is up to whoever holds the receiving end.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::artifact::Artifact;
use crate::state::ConversationState;

/// Events emitted while a turn runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Partial assistant text from the reasoning model.
    TextDelta { content: String },

    /// The agent is calling a tool.
    ToolCall { id: String, name: String },

    /// Tool execution completed.
    ToolResult { id: String, name: String, success: bool },

    /// A tool produced a renderable artifact.
    Artifact { artifact: Artifact },

    /// Full state at a checkpoint (after the merge point, at turn end).
    StateSnapshot { state: Box<ConversationState> },

    /// The turn is complete.
    Done { thread_id: String },

    /// The turn failed; the message is safe to show to a user.
    Error { message: String },
}

impl TurnEvent {
    /// Wire event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "text_delta",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Artifact { .. } => "artifact",
            Self::StateSnapshot { .. } => "state_snapshot",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

/// Optional sending half for turn events.
///
/// A dropped receiver never fails the turn; events are simply discarded.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<TurnEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<TurnEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that discards everything.
    pub fn none() -> Self {
        Self { tx: None }
    }

    /// Create a sink together with its receiver.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TurnEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub async fn emit(&self, event: TurnEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event).await;
        }
    }
}
