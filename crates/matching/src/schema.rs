use extract::{CatalogProduct, ComplianceStatus, Field, Kind, PipelineError, Shape};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::policy::ScoredProduct;

/// One procurement condition to check products against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditalRequirement {
    pub id: String,
    pub title: String,
    pub description: String,
    pub mandatory: bool,
}

impl EditalRequirement {
    /// Build a requirement from loosely typed request JSON, rejecting entries without
    /// an id, title, description or boolean `mandatory` flag.
    pub fn from_value(value: &Value) -> Result<Self, PipelineError> {
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
        };

        let (Some(id), Some(title), Some(description)) =
            (text("id"), text("title"), text("description"))
        else {
            return Err(PipelineError::validation(
                "Each requirement must have id, title, and description",
            ));
        };

        let mandatory = value
            .get("mandatory")
            .and_then(Value::as_bool)
            .ok_or_else(|| {
                PipelineError::validation("Each requirement must have mandatory boolean field")
            })?;

        Ok(Self {
            id,
            title,
            description,
            mandatory,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MatchingInput {
    pub requirements: Vec<EditalRequirement>,
    pub products: Vec<CatalogProduct>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementResult {
    pub product_id: String,
    pub status: ComplianceStatus,
    #[serde(default)]
    pub evidence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementAnalysis {
    pub requirement_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub results: Vec<RequirementResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductEvaluation {
    pub product_id: String,
    #[serde(default)]
    pub product_name: String,
    pub compliance_score: f64,
    #[serde(default)]
    pub blocking_issues: Vec<String>,
}

impl ScoredProduct for ProductEvaluation {
    fn product_id(&self) -> &str {
        &self.product_id
    }

    fn score(&self) -> f64 {
        self.compliance_score
    }

    fn set_score(&mut self, score: f64) {
        self.compliance_score = score;
    }

    fn blocking_issues(&self) -> &[String] {
        &self.blocking_issues
    }
}

/// The selected product, or the minimal set of products covering every mandatory
/// requirement together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestMatch {
    pub product_ids: Vec<String>,
    pub product_names: Vec<String>,
    pub compliance_score: f64,
    #[serde(default)]
    pub justification: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingVerdict {
    pub fully_compliant: bool,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingOutput {
    pub best_match: Option<BestMatch>,
    pub requirement_analysis: Vec<RequirementAnalysis>,
    pub all_products_evaluated: Vec<ProductEvaluation>,
    pub final_verdict: MatchingVerdict,
}

impl MatchingOutput {
    /// Products with a `NOT_COMPLIANT` result on at least one mandatory requirement.
    pub fn products_missing_mandatory(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .requirement_analysis
            .iter()
            .filter(|analysis| analysis.mandatory)
            .flat_map(|analysis| &analysis.results)
            .filter(|result| result.status == ComplianceStatus::NotCompliant)
            .map(|result| result.product_id.as_str())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

pub const MATCHING_SHAPE: Shape = Shape::new(
    "matching",
    &[
        Field::new("final_verdict", Kind::Object),
        Field::new("final_verdict.fully_compliant", Kind::Bool),
        Field::new("requirement_analysis", Kind::Array),
        Field::new("all_products_evaluated", Kind::Array),
    ],
);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requirement_from_complete_value() {
        let req = EditalRequirement::from_value(&json!({
            "id": "REQ-01",
            "title": "Voltagem",
            "description": "220V",
            "mandatory": true,
        }))
        .unwrap();
        assert_eq!(req.id, "REQ-01");
        assert!(req.mandatory);
    }

    #[test]
    fn requirement_without_description_is_rejected() {
        let err = EditalRequirement::from_value(&json!({
            "id": "REQ-01",
            "title": "Voltagem",
            "mandatory": true,
        }))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Each requirement must have id, title, and description"
        );
    }

    #[test]
    fn requirement_with_string_mandatory_is_rejected() {
        let err = EditalRequirement::from_value(&json!({
            "id": "REQ-01",
            "title": "Voltagem",
            "description": "220V",
            "mandatory": "yes",
        }))
        .unwrap_err();
        assert!(err.to_string().contains("mandatory boolean"));
    }

    #[test]
    fn missing_mandatory_results_are_collected_per_product() {
        let output: MatchingOutput = serde_json::from_value(json!({
            "best_match": null,
            "requirement_analysis": [
                {"requirement_id": "R1", "title": "a", "mandatory": true, "results": [
                    {"product_id": "p2", "status": "NOT_COMPLIANT", "evidence": ""},
                    {"product_id": "p1", "status": "COMPLIANT", "evidence": ""}
                ]},
                {"requirement_id": "R2", "title": "b", "mandatory": false, "results": [
                    {"product_id": "p1", "status": "NOT_COMPLIANT", "evidence": ""}
                ]},
                {"requirement_id": "R3", "title": "c", "mandatory": true, "results": [
                    {"product_id": "p2", "status": "NOT_COMPLIANT", "evidence": ""}
                ]}
            ],
            "all_products_evaluated": [],
            "final_verdict": {"fully_compliant": false, "notes": ""}
        }))
        .unwrap();
        assert_eq!(output.products_missing_mandatory(), vec!["p2"]);
    }
}
