pub mod prompt;
pub mod schema;

pub use schema::{
    BestProductIdentified, Confidence, ExtractedRequirement, FinalVerdict, FullPipelineInput,
    FullPipelineOutput, ProductMatchResult, RequirementMatchResult,
};

use std::sync::Arc;

use extract::{
    CompletionModel, CompletionRequest, ModelParams, PipelineError, PipelineResult,
    RetryPolicy, parse_json_safely, validate_into,
};
use matching::{ScorePolicy, policy};
use tracing::{error, info, warn};

/// Requirement extraction and catalog matching in a single model call.
pub struct FullPipeline {
    model: Arc<dyn CompletionModel>,
    retry: RetryPolicy,
    score_policy: ScorePolicy,
}

impl FullPipeline {
    /// Rate-limited calls are retried with the default backoff.
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self {
            model,
            retry: RetryPolicy::default(),
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

    pub async fn run(&self, input: &FullPipelineInput) -> PipelineResult<FullPipelineOutput> {
        let outcome = self.try_run(input).await;
        if let Err(e) = &outcome {
            error!(
                edital = %input.edital_name,
                text_len = input.edital_text.len(),
                products = input.products.len(),
                error = %e,
                "Full pipeline failed"
            );
        }
        PipelineResult::from_outcome(outcome, "Full pipeline failed")
    }

    async fn try_run(&self, input: &FullPipelineInput) -> Result<FullPipelineOutput, PipelineError> {
        if input.edital_text.trim().is_empty() {
            return Err(PipelineError::validation("Edital text is required"));
        }
        if input.products.is_empty() {
            return Err(PipelineError::validation("No products provided"));
        }

        let truncated = prompt::truncate_edital_text(&input.edital_text);
        if truncated.is_some() {
            warn!(
                edital = %input.edital_name,
                chars = input.edital_text.chars().count(),
                limit = prompt::MAX_EDITAL_CHARS,
                "Edital text too long, truncating"
            );
        }
        let edital_text = truncated.as_deref().unwrap_or(&input.edital_text);

        let prompt = prompt::build_full_pipeline_prompt(input, edital_text)
            .map_err(|e| PipelineError::validation(format!("Unserializable input: {e}")))?;
        let request = CompletionRequest::new(prompt, ModelParams::FULL_PIPELINE);

        info!(
            edital = %input.edital_name,
            text_chars = edital_text.chars().count(),
            products = input.products.len(),
            prompt = %request.fingerprint(),
            "Processing edital"
        );

        let text = self
            .retry
            .retry("full_pipeline", || self.model.complete(&request))
            .await?;

        let value = parse_json_safely(&text)?;
        let mut output: FullPipelineOutput =
            validate_into(value, &schema::FULL_PIPELINE_SHAPE)?;
        output.check_references()?;

        let gap_ids: Vec<String> = output
            .product_matching
            .iter()
            .filter(|product| output.missing_mandatory(product))
            .map(|product| product.product_id.clone())
            .collect();
        policy::review_scores(self.score_policy, &mut output.product_matching, |p| {
            gap_ids.contains(&p.product_id)
        });

        info!(
            edital = %input.edital_name,
            requirements = output.extracted_requirements.len(),
            best_product = output
                .best_product_identified
                .as_ref()
                .map_or("None", |best| best.product_name.as_str()),
            can_participate = output.final_verdict.can_participate,
            "Full pipeline completed"
        );
        Ok(output)
    }
}
