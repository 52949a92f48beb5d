use extract::{CatalogProduct, ComplianceStatus, Field, Kind, PipelineError, Shape};
use matching::ScoredProduct;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct FullPipelineInput {
    pub edital_text: String,
    pub edital_name: String,
    pub products: Vec<CatalogProduct>,
}

/// A requested product, normalized and listed once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRequirement {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mandatory: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementMatchResult {
    pub requirement_id: String,
    pub status: ComplianceStatus,
    #[serde(default)]
    pub evidence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductMatchResult {
    pub product_id: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catmat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found_in_catalog: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equivalence_type: Option<String>,
    #[serde(default)]
    pub results: Vec<RequirementMatchResult>,
    pub compliance_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_justification: Option<String>,
    #[serde(default)]
    pub blocking_issues: Vec<String>,
}

impl ScoredProduct for ProductMatchResult {
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

    fn found_in_catalog(&self) -> Option<bool> {
        self.found_in_catalog
    }
}

/// Serialized uppercase; read in any case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl TryFrom<String> for Confidence {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Ok(Confidence::High),
            "MEDIUM" => Ok(Confidence::Medium),
            "LOW" => Ok(Confidence::Low),
            _ => Err(format!(
                "unknown confidence {value:?}, expected HIGH, MEDIUM or LOW"
            )),
        }
    }
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::High => "HIGH",
            Confidence::Medium => "MEDIUM",
            Confidence::Low => "LOW",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestProductIdentified {
    pub product_id: String,
    pub product_name: String,
    pub confidence: Confidence,
    #[serde(default)]
    pub justification: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalVerdict {
    pub can_participate: bool,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullPipelineOutput {
    pub extracted_requirements: Vec<ExtractedRequirement>,
    pub product_matching: Vec<ProductMatchResult>,
    #[serde(default)]
    pub best_product_identified: Option<BestProductIdentified>,
    pub final_verdict: FinalVerdict,
}

impl FullPipelineOutput {
    /// Every per-product result must point at an extracted requirement.
    pub fn check_references(&self) -> Result<(), PipelineError> {
        for (i, product) in self.product_matching.iter().enumerate() {
            for (j, result) in product.results.iter().enumerate() {
                let known = self
                    .extracted_requirements
                    .iter()
                    .any(|req| req.id == result.requirement_id);
                if !known {
                    return Err(PipelineError::schema(
                        format!("product_matching[{i}].results[{j}].requirement_id"),
                        format!("unknown requirement {:?}", result.requirement_id),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Whether `product` has a `NOT_COMPLIANT` result against a mandatory requirement.
    pub fn missing_mandatory(&self, product: &ProductMatchResult) -> bool {
        product.results.iter().any(|result| {
            result.status == ComplianceStatus::NotCompliant
                && self
                    .extracted_requirements
                    .iter()
                    .any(|req| req.mandatory && req.id == result.requirement_id)
        })
    }
}

pub const FULL_PIPELINE_SHAPE: Shape = Shape::new(
    "full_pipeline",
    &[
        Field::new("extracted_requirements", Kind::Array),
        Field::new("product_matching", Kind::Array),
        Field::new("final_verdict", Kind::Object),
        Field::new("final_verdict.can_participate", Kind::Bool),
        Field::new("best_product_identified", Kind::OptionalObject),
    ],
);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn output(value: serde_json::Value) -> FullPipelineOutput {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn optional_descriptive_fields_default_to_absent() {
        let out = output(json!({
            "extracted_requirements": [],
            "product_matching": [
                {"product_id": "p1", "product_name": "SAT 700", "compliance_score": 80}
            ],
            "best_product_identified": null,
            "final_verdict": {"can_participate": false}
        }));
        let product = &out.product_matching[0];
        assert!(product.found_in_catalog.is_none());
        assert!(product.results.is_empty());

        let back = serde_json::to_value(product).unwrap();
        assert!(back.get("catmat").is_none());
    }

    #[test]
    fn confidence_reads_any_case_and_writes_uppercase() {
        for raw in ["MEDIUM", "Medium", " medium "] {
            let best: BestProductIdentified = serde_json::from_value(json!({
                "product_id": "p1",
                "product_name": "Microtak Total",
                "confidence": raw,
                "justification": "Ventilação de transporte"
            }))
            .unwrap();
            assert_eq!(best.confidence, Confidence::Medium);
        }
        assert_eq!(serde_json::to_value(Confidence::Low).unwrap(), "LOW");
        assert!(serde_json::from_value::<Confidence>(json!("certain")).is_err());
    }

    #[test]
    fn dangling_requirement_reference_is_named() {
        let out = output(json!({
            "extracted_requirements": [{"id": "REQ-01", "name": "Produto: Ventilador", "description": "", "mandatory": true}],
            "product_matching": [{
                "product_id": "p1", "product_name": "Microtak Total", "compliance_score": 90,
                "results": [
                    {"requirement_id": "REQ-01", "status": "COMPLIANT", "evidence": ""},
                    {"requirement_id": "REQ-09", "status": "COMPLIANT", "evidence": ""}
                ]
            }],
            "best_product_identified": null,
            "final_verdict": {"can_participate": true, "notes": ""}
        }));
        match out.check_references().unwrap_err() {
            PipelineError::SchemaViolation { field, reason } => {
                assert_eq!(field, "product_matching[0].results[1].requirement_id");
                assert!(reason.contains("REQ-09"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn mandatory_gap_ignores_optional_requirements() {
        let out = output(json!({
            "extracted_requirements": [
                {"id": "R1", "name": "a", "description": "", "mandatory": false},
                {"id": "R2", "name": "b", "description": "", "mandatory": true}
            ],
            "product_matching": [
                {"product_id": "p1", "product_name": "A", "compliance_score": 90,
                 "results": [{"requirement_id": "R1", "status": "NOT_COMPLIANT", "evidence": ""}]},
                {"product_id": "p2", "product_name": "B", "compliance_score": 90,
                 "results": [{"requirement_id": "R2", "status": "NOT_COMPLIANT", "evidence": ""}]}
            ],
            "best_product_identified": null,
            "final_verdict": {"can_participate": false, "notes": ""}
        }));
        assert!(!out.missing_mandatory(&out.product_matching[0]));
        assert!(out.missing_mandatory(&out.product_matching[1]));
    }
}
