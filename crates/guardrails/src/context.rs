//! Conversation context extraction.
//!
//! Both the gate and the safe responder frame "what just happened" the same
//! way: the latest message text plus a short role-tagged transcript of the
//! turns before it.

use finassist_core::message::{Message, Role};

const TOOL_PREVIEW_LINES: usize = 5;
const TOOL_ELISION: &str = "\n[Details shown to user omitted here for brevity.]";

/// Split a history into the latest message text and a transcript of the
/// messages before it, reaching back `max_user_turns` user messages.
///
/// Tool output is cut to its first few non-blank lines.
pub fn extract_context(messages: &[Message], max_user_turns: usize) -> (String, String) {
    let Some((latest, earlier)) = messages.split_last() else {
        return (String::new(), String::new());
    };

    let mut collected = Vec::new();
    let mut user_turns = 0;
    for message in earlier.iter().rev() {
        let tag = role_tag(message.role());
        let content = match message.role() {
            Role::Tool => truncate_tool_output(&message.text()),
            _ => message.text(),
        };
        if content.is_empty() {
            continue;
        }
        collected.push(format!("<{tag}>{content}</{tag}>"));

        if message.role() == Role::User {
            user_turns += 1;
            if user_turns >= max_user_turns {
                break;
            }
        }
    }

    collected.reverse();
    (latest.text(), collected.join("\n"))
}

fn role_tag(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
        Role::System => "unknown",
    }
}

fn truncate_tool_output(content: &str) -> String {
    let lines: Vec<&str> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(TOOL_PREVIEW_LINES)
        .collect();
    if lines.is_empty() {
        return String::new();
    }
    format!("{}{TOOL_ELISION}", lines.join("\n"))
}
