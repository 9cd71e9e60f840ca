//! Renderable artifacts produced by tools.
//!
//! An artifact's `id` is the id of the tool call that produced it. Artifacts
//! are immutable once created and are only ever appended to state.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The kind of renderable result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactKind {
    PieChart,
    BarChart,
    LineChart,
    AreaChart,
    ReassessTable,
    RefinanceTable,
    MsdUpload,
    ProductRecommendation,
}

impl ArtifactKind {
    pub fn is_chart(&self) -> bool {
        matches!(
            self,
            ArtifactKind::PieChart
                | ArtifactKind::BarChart
                | ArtifactKind::LineChart
                | ArtifactKind::AreaChart
        )
    }
}

/// One data point of a chart. `x` is the category or time axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowData {
    pub x: serde_json::Value,
    pub y0: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y2: Option<f64>,
}

/// Human-readable axis/series labels for a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataLabels {
    pub x: String,
    pub y0: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y2: Option<String>,
}

/// Payload of a chart artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub rows: Vec<RowData>,
    pub labels: DataLabels,
}

/// A structured, renderable tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// The originating tool call id
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(rename = "type")]
    pub kind: ArtifactKind,

    /// Kind-specific payload
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Artifact {
    pub fn new(
        id: impl Into<String>,
        kind: ArtifactKind,
        name: impl Into<String>,
        description: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            kind,
            data,
        }
    }

    /// Build a chart artifact from typed chart data.
    pub fn chart(
        id: impl Into<String>,
        kind: ArtifactKind,
        name: impl Into<String>,
        description: impl Into<String>,
        chart: &ChartData,
    ) -> Self {
        let data = serde_json::to_value(chart).unwrap_or(serde_json::Value::Null);
        Self::new(id, kind, name, description, data)
    }
}

/// Merge two artifact lists, keeping the first artifact seen for each id.
///
/// Entries from `left` take precedence over entries from `right`.
pub fn merge_artifacts(left: &[Artifact], right: &[Artifact]) -> Vec<Artifact> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut merged = Vec::with_capacity(left.len() + right.len());
    for artifact in left.iter().chain(right.iter()) {
        if seen.insert(artifact.id.as_str()) {
            merged.push(artifact.clone());
        }
    }
    merged
}
