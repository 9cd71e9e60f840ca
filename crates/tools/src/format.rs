//! Shared shapes for tool output.

use finassist_core::artifact::Artifact;
use finassist_core::error::ToolError;
use finassist_core::event::TurnEvent;
use finassist_core::message::Message;
use finassist_core::state::StateUpdate;
use finassist_core::tool::{ToolContext, ToolOutput};
use serde::de::DeserializeOwned;

/// Standard JSON body of a tool message.
///
/// `artifact_rendered` tells the model whether the user already sees a
/// component, so it does not repeat the numbers in prose.
pub fn tool_message_content(
    call_id: &str,
    artifact_rendered: bool,
    name: &str,
    description: &str,
    data: Option<serde_json::Value>,
) -> String {
    let mut body = serde_json::json!({
        "tool_call_id": call_id,
        "artifact_rendered": artifact_rendered,
        "name": name,
        "description": description,
    });
    if let Some(data) = data {
        body["data"] = data;
    }
    body.to_string()
}

/// Emit an artifact event and return the state patch carrying both the tool
/// message and the artifact.
pub async fn render_artifact(
    ctx: &ToolContext<'_>,
    tool_name: &str,
    artifact: Artifact,
    content: String,
) -> ToolOutput {
    ctx.events
        .emit(TurnEvent::Artifact {
            artifact: artifact.clone(),
        })
        .await;

    ToolOutput::Update(
        StateUpdate::new()
            .with_message(Message::tool_result(ctx.call_id, tool_name, content))
            .with_artifact(artifact),
    )
}

/// Deserialize tool arguments into a typed struct.
pub fn parse_args<T: DeserializeOwned>(arguments: serde_json::Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Shorthand for an execution failure.
pub fn failed(tool_name: &str, reason: impl Into<String>) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: tool_name.to_string(),
        reason: reason.into(),
    }
}

/// Round to cents for display.
pub fn cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
