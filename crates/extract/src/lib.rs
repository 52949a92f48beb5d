pub mod catalog;
pub mod error;
pub mod llm;
pub mod prompt;
pub mod repair;
pub mod retry;
pub mod schema;
pub mod validate;

pub use catalog::CatalogProduct;
pub use error::{ErrorKind, PipelineError, PipelineResult};
pub use llm::{
    AnthropicClient, CompletionModel, CompletionRequest, ModelParams, ModelSettings,
    ScriptedModel,
};
pub use repair::parse_json_safely;
pub use retry::{RetryConfig, RetryPolicy};
pub use schema::{AnalysisInput, AnalysisOutput, ComplianceStatus};
pub use validate::{validate_into, Field, Kind, Shape};

use std::sync::Arc;

use tracing::{error, info};

/// Single-call tender assessment: summary, clarity verdict, recommendations.
pub struct Extractor {
    model: Arc<dyn CompletionModel>,
    retry: RetryPolicy,
}

impl Extractor {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self {
            model,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run the assessment. Never fails past this boundary: every problem ends up in
    /// the returned envelope.
    pub async fn process(&self, input: &AnalysisInput) -> PipelineResult<AnalysisOutput> {
        let outcome = self.try_process(input).await;
        if let Err(e) = &outcome {
            error!(
                edital = %input.edital_name,
                text_len = input.edital_text.len(),
                error = %e,
                "Analysis pipeline failed"
            );
        }
        PipelineResult::from_outcome(outcome, "AI processing failed")
    }

    async fn try_process(&self, input: &AnalysisInput) -> Result<AnalysisOutput, PipelineError> {
        if input.edital_text.trim().is_empty() {
            return Err(PipelineError::validation(
                "Edital text is required and cannot be empty",
            ));
        }
        if input.edital_name.trim().is_empty() {
            return Err(PipelineError::validation("Edital name is required"));
        }

        let request = CompletionRequest::new(
            prompt::build_analysis_prompt(input),
            ModelParams::EXTRACTION,
        );

        let text = self
            .retry
            .retry("analysis", || self.model.complete(&request))
            .await?;

        let value = parse_json_safely(&text)?;
        let output: AnalysisOutput = validate_into(value, &schema::ANALYSIS_SHAPE)?;

        info!(
            edital = %input.edital_name,
            compliance = output.compliance,
            recommendations = output.recommendations.len(),
            "Analysis completed"
        );
        Ok(output)
    }
}
