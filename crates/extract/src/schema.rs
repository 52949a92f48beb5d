use serde::{Deserialize, Serialize};

use crate::validate::{Field, Kind, Shape};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisInput {
    pub edital_text: String,
    pub edital_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// The single-call assessment of a tender document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub summary: String,
    /// Whether the requirements are clear and verifiable.
    pub compliance: bool,
    pub recommendations: Vec<String>,
}

pub const ANALYSIS_SHAPE: Shape = Shape::new(
    "analysis",
    &[
        Field::new("summary", Kind::NonEmptyString),
        Field::new("compliance", Kind::Bool),
        Field::new("recommendations", Kind::StringArray),
    ],
);

/// Per-requirement verdict used by both matching outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    PartiallyCompliant,
    NotCompliant,
}
