pub mod policy;
pub mod prompt;
pub mod schema;

pub use policy::{ScorePolicy, ScoreRule, ScoreViolation, ScoredProduct};
pub use schema::{
    BestMatch, EditalRequirement, MatchingInput, MatchingOutput, MatchingVerdict,
    ProductEvaluation, RequirementAnalysis, RequirementResult,
};

use std::sync::Arc;

use extract::{
    CompletionModel, CompletionRequest, ModelParams, PipelineError, PipelineResult,
    RetryPolicy, parse_json_safely, validate_into,
};
use tracing::{error, info};

/// Scores catalog products against already-extracted requirements.
pub struct ProductMatcher {
    model: Arc<dyn CompletionModel>,
    retry: RetryPolicy,
    score_policy: ScorePolicy,
}

impl ProductMatcher {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self {
            model,
            retry: RetryPolicy::none(),
            score_policy: ScorePolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_score_policy(mut self, score_policy: ScorePolicy) -> Self {
        self.score_policy = score_policy;
        self
    }

    pub async fn match_products(&self, input: &MatchingInput) -> PipelineResult<MatchingOutput> {
        let outcome = self.try_match(input).await;
        if let Err(e) = &outcome {
            error!(
                requirement_count = input.requirements.len(),
                product_count = input.products.len(),
                error = %e,
                "Product matching failed"
            );
        }
        PipelineResult::from_outcome(outcome, "Product matching failed")
    }

    async fn try_match(&self, input: &MatchingInput) -> Result<MatchingOutput, PipelineError> {
        if input.requirements.is_empty() {
            return Err(PipelineError::validation("No requirements provided"));
        }
        if input.products.is_empty() {
            return Err(PipelineError::validation("No products provided for matching"));
        }
        if input.requirements.iter().any(|r| {
            r.id.trim().is_empty() || r.title.trim().is_empty() || r.description.trim().is_empty()
        }) {
            return Err(PipelineError::validation(
                "Each requirement must have id, title, and description",
            ));
        }

        let prompt = prompt::build_matching_prompt(input)
            .map_err(|e| PipelineError::validation(format!("Unserializable input: {e}")))?;
        let request = CompletionRequest::new(prompt, ModelParams::MATCHING);

        let text = self
            .retry
            .retry("product_matching", || self.model.complete(&request))
            .await?;

        let value = parse_json_safely(&text)?;
        let mut output: MatchingOutput = validate_into(value, &schema::MATCHING_SHAPE)?;

        let missing: Vec<String> = output
            .products_missing_mandatory()
            .into_iter()
            .map(str::to_string)
            .collect();
        policy::review_scores(
            self.score_policy,
            &mut output.all_products_evaluated,
            |p| missing.iter().any(|id| id == &p.product_id),
        );

        info!(
            products_evaluated = output.all_products_evaluated.len(),
            best_match = ?output.best_match.as_ref().map(|b| &b.product_names),
            fully_compliant = output.final_verdict.fully_compliant,
            "Product matching completed"
        );
        Ok(output)
    }
}
