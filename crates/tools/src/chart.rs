//! `send_user_visual`: render a chart the model has already computed.

use async_trait::async_trait;
use finassist_core::artifact::{Artifact, ArtifactKind, ChartData, DataLabels, RowData};
use finassist_core::error::ToolError;
use finassist_core::event::TurnEvent;
use finassist_core::message::Message;
use finassist_core::state::StateUpdate;
use finassist_core::tool::{Tool, ToolContext, ToolOutput};
use serde::Deserialize;

use crate::format::{failed, parse_args};

#[derive(Debug, Deserialize)]
struct VisualArgs {
    chart_type: ArtifactKind,
    name: String,
    description: String,
    rows: Vec<RowData>,
    labels: DataLabels,
}

pub struct SendUserVisualTool;

impl SendUserVisualTool {
    const NAME: &'static str = "send_user_visual";
}

#[async_trait]
impl Tool for SendUserVisualTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Send a chart to the user, displayed in the chat interface. Provide a short title, a few \
         sentences of context, the chart type, axis/series labels and the data rows. Series y1 and \
         y2 are optional; use them for comparisons (LINE_CHART) or ranges (AREA_CHART)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "chart_type": {
                    "type": "string",
                    "enum": ["PIE_CHART", "BAR_CHART", "LINE_CHART", "AREA_CHART"],
                    "description": "Type of chart to display"
                },
                "name": {
                    "type": "string",
                    "description": "Title for the chart"
                },
                "description": {
                    "type": "string",
                    "description": "What the chart shows"
                },
                "rows": {
                    "type": "array",
                    "description": "Data points, e.g. {\"x\": \"Checking\", \"y0\": 1000}",
                    "items": {
                        "type": "object",
                        "properties": {
                            "x": {"type": ["string", "number"]},
                            "y0": {"type": "number"},
                            "y1": {"type": "number"},
                            "y2": {"type": "number"}
                        },
                        "required": ["x", "y0"]
                    }
                },
                "labels": {
                    "type": "object",
                    "description": "Labels for the x axis and each series",
                    "properties": {
                        "x": {"type": "string"},
                        "y0": {"type": "string"},
                        "y1": {"type": "string"},
                        "y2": {"type": "string"}
                    },
                    "required": ["x", "y0"]
                }
            },
            "required": ["chart_type", "name", "description", "rows", "labels"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext<'_>,
    ) -> Result<ToolOutput, ToolError> {
        let args: VisualArgs = parse_args(arguments)?;
        if !args.chart_type.is_chart() {
            return Err(failed(
                Self::NAME,
                "chart_type must be one of PIE_CHART, BAR_CHART, LINE_CHART, AREA_CHART",
            ));
        }
        if args.rows.is_empty() {
            return Err(failed(Self::NAME, "rows must contain at least one data point"));
        }

        let chart = ChartData {
            rows: args.rows,
            labels: args.labels,
        };
        let artifact = Artifact::chart(ctx.call_id, args.chart_type, args.name, args.description, &chart);
        ctx.events
            .emit(TurnEvent::Artifact {
                artifact: artifact.clone(),
            })
            .await;

        let content = serde_json::json!({
            "response": "Successfully displayed visual component to user.",
            "id": ctx.call_id,
        })
        .to_string();

        Ok(ToolOutput::Update(
            StateUpdate::new()
                .with_message(Message::tool_result(ctx.call_id, Self::NAME, content))
                .with_artifact(artifact),
        ))
    }
}
