//! Conversation state and its per-field merge rules.
//!
//! [`ConversationState`] is the single record threaded through every node of a
//! turn. Nodes never mutate it directly; they return a [`StateUpdate`] patch
//! which the orchestration layer applies with explicit reducers:
//!
//! | field                  | rule                                          |
//! |------------------------|-----------------------------------------------|
//! | `messages`             | append; an existing id is replaced in place   |
//! | `artifacts`            | append, deduplicated by id (first seen wins)  |
//! | `blocked_message_ids`  | set union                                     |
//! | everything else        | replace whole value                           |

use crate::artifact::{Artifact, merge_artifacts};
use crate::message::Message;
use crate::retrieval::Chunk;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Verdict of the input guardrail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub reasoning: String,
    pub blocked: bool,
}

impl ValidationResult {
    pub fn blocked(reasoning: impl Into<String>) -> Self {
        Self {
            reasoning: reasoning.into(),
            blocked: true,
        }
    }

    pub fn allowed(reasoning: impl Into<String>) -> Self {
        Self {
            reasoning: reasoning.into(),
            blocked: false,
        }
    }
}

/// Retrieval context for the current turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct References {
    pub perform_rag: bool,
    pub rag_query: String,
    #[serde(default)]
    pub retrieved_chunks: Vec<Chunk>,
}

impl References {
    /// The value used when no retrieval happened.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Per-user profile snapshot, set at thread creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub income: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marital_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_pslf_eligible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employment_type: Option<String>,
    /// Product keys the user has access to
    #[serde(default)]
    pub product_combination: Vec<String>,
    /// Whether the user's loan data has been connected
    #[serde(default)]
    pub loans_connected: bool,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The state of one conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub thread_id: String,
    pub user_id: String,

    #[serde(default)]
    pub messages: Vec<Message>,

    #[serde(default)]
    pub react_loop_iterations: u32,

    #[serde(default)]
    pub guardrail_assessment: Option<ValidationResult>,

    #[serde(default)]
    pub blocked_message_ids: BTreeSet<String>,

    #[serde(default)]
    pub references: Option<References>,

    #[serde(default)]
    pub artifacts: Vec<Artifact>,

    #[serde(default)]
    pub user_info: UserProfile,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ConversationState {
    pub fn new(
        thread_id: impl Into<String>,
        user_id: impl Into<String>,
        user_info: UserProfile,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            messages: Vec::new(),
            react_loop_iterations: 0,
            guardrail_assessment: None,
            blocked_message_ids: BTreeSet::new(),
            references: None,
            artifacts: Vec::new(),
            user_info,
            title: None,
        }
    }

    pub fn latest_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Apply a patch using the per-field reducers.
    pub fn apply(&mut self, update: StateUpdate) {
        merge_messages(&mut self.messages, update.messages);
        if let Some(n) = update.react_loop_iterations {
            self.react_loop_iterations = n;
        }
        if let Some(assessment) = update.guardrail_assessment {
            self.guardrail_assessment = Some(assessment);
        }
        self.blocked_message_ids.extend(update.blocked_message_ids);
        if let Some(references) = update.references {
            self.references = Some(references);
        }
        if !update.artifacts.is_empty() {
            self.artifacts = merge_artifacts(&self.artifacts, &update.artifacts);
        }
        if let Some(user_info) = update.user_info {
            self.user_info = user_info;
        }
        if let Some(title) = update.title {
            self.title = Some(title);
        }
    }

    /// Clear the turn-scoped fields so a prior turn's values cannot leak
    /// into this turn's routing.
    pub fn begin_turn(&mut self) {
        self.guardrail_assessment = None;
        self.references = None;
    }
}

/// A patch produced by a node or a tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub react_loop_iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardrail_assessment: Option<ValidationResult>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub blocked_message_ids: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<References>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn with_iterations(mut self, n: u32) -> Self {
        self.react_loop_iterations = Some(n);
        self
    }

    pub fn with_assessment(mut self, assessment: ValidationResult) -> Self {
        self.guardrail_assessment = Some(assessment);
        self
    }

    pub fn with_blocked_id(mut self, id: impl Into<String>) -> Self {
        self.blocked_message_ids.insert(id.into());
        self
    }

    pub fn with_references(mut self, references: References) -> Self {
        self.references = Some(references);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Combine two patches produced concurrently.
    ///
    /// List and set fields use the same reducers as [`ConversationState::apply`];
    /// replace-fields take `other`'s value when both are set.
    pub fn merge(mut self, other: StateUpdate) -> StateUpdate {
        merge_messages(&mut self.messages, other.messages);
        self.artifacts = merge_artifacts(&self.artifacts, &other.artifacts);
        self.blocked_message_ids.extend(other.blocked_message_ids);
        self.react_loop_iterations = other.react_loop_iterations.or(self.react_loop_iterations);
        self.guardrail_assessment = other.guardrail_assessment.or(self.guardrail_assessment);
        self.references = other.references.or(self.references);
        self.user_info = other.user_info.or(self.user_info);
        self.title = other.title.or(self.title);
        self
    }
}

/// Append `incoming` to `existing`.
///
/// Messages without an id get a fresh one. A message whose id already exists
/// replaces the earlier message in place, keeping its slot.
pub fn merge_messages(existing: &mut Vec<Message>, incoming: Vec<Message>) {
    for mut message in incoming {
        message.ensure_id();
        let slot = message
            .id()
            .and_then(|id| existing.iter().position(|m| m.id() == Some(id)));
        match slot {
            Some(index) => existing[index] = message,
            None => existing.push(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactKind;
    use crate::message::Content;
    use serde_json::json;

    fn state() -> ConversationState {
        ConversationState::new("thread-1", "user-1", UserProfile::default())
    }

    #[test]
    fn messages_append() {
        let mut s = state();
        s.apply(StateUpdate::new().with_message(Message::user("one")));
        s.apply(StateUpdate::new().with_message(Message::assistant("two")));
        assert_eq!(s.messages.len(), 2);
        assert_eq!(s.messages[1].text(), "two");
    }

    #[test]
    fn message_with_existing_id_replaces_in_place() {
        let mut s = state();
        s.apply(
            StateUpdate::new()
                .with_message(Message::User {
                    id: Some("m1".into()),
                    content: "original".into(),
                })
                .with_message(Message::assistant("reply")),
        );
        s.apply(StateUpdate::new().with_message(Message::User {
            id: Some("m1".into()),
            content: Content::Text("edited".into()),
        }));
        assert_eq!(s.messages.len(), 2);
        assert_eq!(s.messages[0].text(), "edited");
    }

    #[test]
    fn messages_without_id_receive_one() {
        let mut s = state();
        s.apply(StateUpdate::new().with_message(Message::Assistant {
            id: None,
            content: "x".into(),
            tool_calls: vec![],
        }));
        assert!(s.messages[0].id().is_some());
    }

    #[test]
    fn blocked_ids_union() {
        let mut s = state();
        s.apply(StateUpdate::new().with_blocked_id("a"));
        s.apply(StateUpdate::new().with_blocked_id("b"));
        s.apply(StateUpdate::new());
        assert_eq!(s.blocked_message_ids.len(), 2);
    }

    #[test]
    fn replace_fields_replace() {
        let mut s = state();
        s.apply(StateUpdate::new().with_iterations(3));
        s.apply(StateUpdate::new().with_iterations(0));
        assert_eq!(s.react_loop_iterations, 0);

        s.apply(StateUpdate::new().with_assessment(ValidationResult::blocked("x")));
        s.apply(StateUpdate::new().with_assessment(ValidationResult::allowed("y")));
        assert!(!s.guardrail_assessment.as_ref().unwrap().blocked);
    }

    #[test]
    fn artifacts_dedupe_on_apply() {
        let mut s = state();
        let a = Artifact::new("a", ArtifactKind::BarChart, "first", "", json!({}));
        let a2 = Artifact::new("a", ArtifactKind::BarChart, "second", "", json!({}));
        s.apply(StateUpdate::new().with_artifact(a));
        s.apply(StateUpdate::new().with_artifact(a2));
        assert_eq!(s.artifacts.len(), 1);
        assert_eq!(s.artifacts[0].name, "first");
    }

    #[test]
    fn concurrent_patches_merge_disjoint_fields() {
        let init = StateUpdate::new().with_iterations(0).with_title("Title");
        let gate = StateUpdate::new()
            .with_assessment(ValidationResult::blocked("bad"))
            .with_blocked_id("m1");
        let merged = init.merge(gate);
        assert_eq!(merged.react_loop_iterations, Some(0));
        assert_eq!(merged.title.as_deref(), Some("Title"));
        assert!(merged.guardrail_assessment.unwrap().blocked);
        assert!(merged.blocked_message_ids.contains("m1"));
    }

    #[test]
    fn begin_turn_clears_turn_scoped_fields() {
        let mut s = state();
        s.apply(
            StateUpdate::new()
                .with_assessment(ValidationResult::blocked("old"))
                .with_references(References::empty())
                .with_blocked_id("m0"),
        );
        s.begin_turn();
        assert!(s.guardrail_assessment.is_none());
        assert!(s.references.is_none());
        assert!(s.blocked_message_ids.contains("m0"));
    }

    #[test]
    fn state_roundtrips_through_json() {
        let mut s = state();
        s.apply(StateUpdate::new().with_message(Message::user("hello")));
        let json = serde_json::to_string(&s).unwrap();
        let back: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
