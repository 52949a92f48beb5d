use serde::Serialize;
use thiserror::Error;

/// Everything that can go wrong between a caller's input and a validated model answer.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Malformed caller input. Never retried.
    #[error("{0}")]
    Validation(String),

    /// The model credential (or other required setting) is missing.
    #[error("{0}")]
    Configuration(String),

    /// The model's text could not be coerced into JSON.
    #[error(
        "Failed to parse JSON: {message}. Original error: {original_error} \
         (original text: {original_excerpt:?}; cleaned text: {cleaned_excerpt:?})"
    )]
    UpstreamParse {
        message: String,
        original_error: String,
        original_excerpt: String,
        cleaned_excerpt: String,
    },

    /// The JSON parsed but does not have the expected shape.
    #[error("Invalid or missing \"{field}\" field: {reason}")]
    SchemaViolation { field: String, reason: String },

    #[error("Rate limited by model provider: {message}")]
    RateLimit {
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Unexpected response type from model: {0}")]
    UnexpectedResponseType(String),

    #[error("Model provider returned error (status {status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    Transport(String),
}

/// Coarse classification of a [`PipelineError`], kept next to the envelope so that an
/// HTTP layer can choose a status code without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    Configuration,
    UpstreamParse,
    SchemaViolation,
    RateLimit,
    UnexpectedResponseType,
    Upstream,
    Transport,
}

impl PipelineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn schema(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::UpstreamParse { .. } => ErrorKind::UpstreamParse,
            Self::SchemaViolation { .. } => ErrorKind::SchemaViolation,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::UnexpectedResponseType(_) => ErrorKind::UnexpectedResponseType,
            Self::Upstream { .. } => ErrorKind::Upstream,
            Self::Transport(_) => ErrorKind::Transport,
        }
    }

    /// Only throttling is transient; every other failure is final for the call.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimit { .. })
    }
}

/// The `{success, data?, error?}` envelope every pipeline returns.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub kind: Option<ErrorKind>,
}

impl<T> PipelineResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            kind: None,
        }
    }

    pub fn failure(kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            kind: Some(kind),
        }
    }

    /// Fold an internal outcome into the envelope. Input validation messages are
    /// surfaced verbatim; anything else gets the pipeline's `label` as prefix.
    pub fn from_outcome(outcome: Result<T, PipelineError>, label: &str) -> Self {
        match outcome {
            Ok(data) => Self::ok(data),
            Err(PipelineError::Validation(message)) => {
                Self::failure(ErrorKind::Validation, message)
            }
            Err(err) => Self::failure(err.kind(), format!("{label}: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_are_not_prefixed() {
        let result: PipelineResult<()> = PipelineResult::from_outcome(
            Err(PipelineError::validation("Edital name is required")),
            "AI processing failed",
        );
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Edital name is required"));
        assert_eq!(result.kind, Some(ErrorKind::Validation));
    }

    #[test]
    fn other_errors_carry_the_pipeline_label() {
        let result: PipelineResult<()> = PipelineResult::from_outcome(
            Err(PipelineError::schema("compliance", "expected boolean")),
            "AI processing failed",
        );
        let error = result.error.unwrap();
        assert!(error.starts_with("AI processing failed: "));
        assert!(error.contains("compliance"));
    }

    #[test]
    fn envelope_serializes_without_empty_fields() {
        let ok = serde_json::to_value(PipelineResult::ok(1)).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true, "data": 1}));

        let failed: PipelineResult<i32> =
            PipelineResult::failure(ErrorKind::Transport, "boom");
        let failed = serde_json::to_value(failed).unwrap();
        assert_eq!(failed, serde_json::json!({"success": false, "error": "boom"}));
    }

    #[test]
    fn only_rate_limits_are_retryable() {
        let throttled = PipelineError::RateLimit {
            message: "slow down".into(),
            retry_after_secs: None,
        };
        assert!(throttled.is_rate_limited());
        assert!(!PipelineError::Transport("reset".into()).is_rate_limited());
        assert!(
            !PipelineError::Upstream {
                status: 500,
                body: String::new()
            }
            .is_rate_limited()
        );
    }
}
