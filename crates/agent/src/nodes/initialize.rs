//! Turn initialization: reset the loop counter, keep the thread title.

use std::sync::Arc;

use finassist_core::message::{Message, Role};
use finassist_core::state::{ConversationState, StateUpdate};
use finassist_core::store::ThreadStore;
use tracing::{info, warn};

const TITLE_CHARS: usize = 50;
const TITLE_WINDOW: usize = 3;

pub struct Initialize {
    threads: Arc<dyn ThreadStore>,
}

impl Initialize {
    pub fn new(threads: Arc<dyn ThreadStore>) -> Self {
        Self { threads }
    }

    /// Touches only the iteration counter and the title.
    pub async fn run(&self, state: &ConversationState) -> StateUpdate {
        let mut update = StateUpdate::new().with_iterations(0);

        let Some(title) = derive_title(&state.messages) else {
            return update;
        };
        if state.title.as_deref() == Some(title.as_str()) {
            return update;
        }

        match self
            .threads
            .update_title(&state.user_id, &state.thread_id, &title)
            .await
        {
            Ok(()) => {
                info!(thread_id = %state.thread_id, "Updated thread title");
                update = update.with_title(title);
            }
            Err(e) => warn!(thread_id = %state.thread_id, error = %e, "Failed to persist thread title"),
        }
        update
    }
}

/// Title from the first assistant reply with text, while the thread has
/// between one and three assistant messages.
pub fn derive_title(messages: &[Message]) -> Option<String> {
    let assistant: Vec<&Message> = messages
        .iter()
        .filter(|m| m.role() == Role::Assistant)
        .take(TITLE_WINDOW + 1)
        .collect();
    if assistant.is_empty() || assistant.len() > TITLE_WINDOW {
        return None;
    }

    assistant
        .iter()
        .map(|m| m.text())
        .find(|text| !text.is_empty())
        .map(|text| truncate_title(&text))
}

/// Cut to the character limit, back off to the last space, add an ellipsis.
pub fn truncate_title(text: &str) -> String {
    let head: String = text.chars().take(TITLE_CHARS).collect();
    match head.rfind(' ') {
        Some(idx) => format!("{}...", &head[..idx]),
        None => format!("{head}..."),
    }
}
