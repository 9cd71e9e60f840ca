//! `upload_student_data`: prompt the user to connect their federal loan data.

use async_trait::async_trait;
use finassist_core::artifact::{Artifact, ArtifactKind};
use finassist_core::error::ToolError;
use finassist_core::tool::{Tool, ToolContext, ToolOutput};

use crate::format::{render_artifact, tool_message_content};

pub struct UploadStudentDataTool;

impl UploadStudentDataTool {
    const NAME: &'static str = "upload_student_data";
}

#[async_trait]
impl Tool for UploadStudentDataTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Show the user a component with step by step instructions for downloading their \
         MyStudentData file from studentaid.gov and an upload button. Use it when personalized \
         answers need the user's federal loan details and they have not connected their loans."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(
        &self,
        _arguments: serde_json::Value,
        ctx: &ToolContext<'_>,
    ) -> Result<ToolOutput, ToolError> {
        let artifact = Artifact::new(
            ctx.call_id,
            ArtifactKind::MsdUpload,
            "Upload your MyStudentData file",
            "A component with step by step instructions for uploading your MyStudentData file and a file upload button.",
            serde_json::json!({}),
        );
        let content = tool_message_content(
            ctx.call_id,
            true,
            &artifact.name,
            "Upload interface for My Student Data file from studentaid.gov",
            None,
        );
        Ok(render_artifact(ctx, Self::NAME, artifact, content).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finassist_core::event::EventSink;
    use finassist_core::state::{ConversationState, UserProfile};

    #[tokio::test]
    async fn produces_upload_artifact() {
        let state = ConversationState::new("t", "u", UserProfile::default());
        let events = EventSink::none();
        let ctx = ToolContext { call_id: "call_up", state: &state, events: &events };

        let ToolOutput::Update(update) = UploadStudentDataTool
            .execute(serde_json::json!({}), &ctx)
            .await
            .unwrap()
        else {
            panic!("expected state update");
        };
        assert_eq!(update.artifacts[0].kind, ArtifactKind::MsdUpload);
        assert_eq!(update.artifacts[0].id, "call_up");
        assert_eq!(update.artifacts[0].data, serde_json::json!({}));

        let message = &update.messages[0];
        assert_eq!(message.tool_calls().len(), 0);
        assert!(message.id().is_some());
        let content: serde_json::Value = serde_json::from_str(&message.text()).unwrap();
        assert_eq!(content["artifact_rendered"], true);
        assert!(content.get("data").is_none());
    }
}
