//! Message domain types.
//!
//! A conversation is a sequence of [`Message`] values. Each message is one of
//! four closed variants (user, assistant, tool, system) and carries an optional
//! identifier plus its content, which is either plain text or a list of
//! structured content blocks.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions or notices
    System,
    /// Tool execution result
    Tool,
}

/// Message content: either plain text or structured content blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<serde_json::Value>),
}

impl Content {
    /// Flatten the content to a single string.
    ///
    /// Text-bearing blocks are joined with a space. A block list with no text
    /// falls back to its JSON string form.
    pub fn as_text(&self) -> String {
        match self {
            Content::Text(s) => s.trim().to_string(),
            Content::Blocks(blocks) => {
                let texts: Vec<&str> = blocks
                    .iter()
                    .filter_map(|b| match b {
                        serde_json::Value::String(s) => Some(s.as_str()),
                        serde_json::Value::Object(map) => map.get("text").and_then(|t| t.as_str()),
                        _ => None,
                    })
                    .collect();
                if texts.is_empty() {
                    serde_json::Value::Array(blocks.clone()).to_string()
                } else {
                    texts.join(" ").trim().to_string()
                }
            }
        }
    }

    /// True for an empty string or an empty block list.
    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(s) => s.is_empty(),
            Content::Blocks(b) => b.is_empty(),
        }
    }
}

impl Default for Content {
    fn default() -> Self {
        Content::Text(String::new())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as JSON string
    pub arguments: String,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    User {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        content: Content,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default)]
        content: Content,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<MessageToolCall>,
    },
    Tool {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        content: Content,
        tool_call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    System {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        content: Content,
    },
}

fn new_id() -> Option<String> {
    Some(Uuid::new_v4().to_string())
}

impl Message {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            id: new_id(),
            content: Content::Text(content.into()),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            id: new_id(),
            content: Content::Text(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Create an assistant message that requests tool calls.
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<MessageToolCall>,
    ) -> Self {
        Message::Assistant {
            id: new_id(),
            content: Content::Text(content.into()),
            tool_calls,
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            id: new_id(),
            content: Content::Text(content.into()),
        }
    }

    /// Create a tool result message.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Message::Tool {
            id: new_id(),
            content: Content::Text(content.into()),
            tool_call_id: tool_call_id.into(),
            name: Some(name.into()),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Message::User { .. } => Role::User,
            Message::Assistant { .. } => Role::Assistant,
            Message::Tool { .. } => Role::Tool,
            Message::System { .. } => Role::System,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Message::User { id, .. }
            | Message::Assistant { id, .. }
            | Message::Tool { id, .. }
            | Message::System { id, .. } => id.as_deref(),
        }
    }

    /// Assign an id if the message has none.
    pub fn ensure_id(&mut self) {
        let slot = match self {
            Message::User { id, .. }
            | Message::Assistant { id, .. }
            | Message::Tool { id, .. }
            | Message::System { id, .. } => id,
        };
        if slot.is_none() {
            *slot = new_id();
        }
    }

    pub fn content(&self) -> &Content {
        match self {
            Message::User { content, .. }
            | Message::Assistant { content, .. }
            | Message::Tool { content, .. }
            | Message::System { content, .. } => content,
        }
    }

    /// Flattened text of the content.
    pub fn text(&self) -> String {
        self.content().as_text()
    }

    /// Tool calls requested by an assistant message; empty for other roles.
    pub fn tool_calls(&self) -> &[MessageToolCall] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }
}
