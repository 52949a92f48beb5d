use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::PipelineError;

pub const CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";
pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Token budget and sampling temperature for one kind of call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ModelParams {
    pub const EXTRACTION: Self = Self {
        max_tokens: 2048,
        temperature: 0.2,
    };
    pub const MATCHING: Self = Self {
        max_tokens: 4096,
        temperature: 0.1,
    };
    pub const FULL_PIPELINE: Self = Self {
        max_tokens: 8000,
        temperature: 0.2,
    };
    pub const HEALTH_CHECK: Self = Self {
        max_tokens: 10,
        temperature: 0.0,
    };
}

/// A single-turn prompt plus its call parameters.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub params: ModelParams,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, params: ModelParams) -> Self {
        Self {
            prompt: prompt.into(),
            params,
        }
    }

    /// Short stable digest of the prompt, used to correlate log lines.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.prompt.as_bytes());
        hex::encode(&digest[..6])
    }
}

/// The external text-completion capability.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Run the prompt once and return the raw text of the answer.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, PipelineError>;

    fn model_id(&self) -> &str;

    async fn health_check(&self) -> bool {
        let ping = CompletionRequest::new("ping", ModelParams::HEALTH_CHECK);
        self.complete(&ping).await.is_ok()
    }
}

/// Connection settings for the hosted model. The credential may be absent; that only
/// becomes an error when a call is attempted.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub api_version: String,
    pub request_timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: ANTHROPIC_API_URL.to_string(),
            model: CLAUDE_MODEL.to_string(),
            api_version: ANTHROPIC_VERSION.to_string(),
            request_timeout_secs: 300,
        }
    }
}

impl fmt::Debug for ModelSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_version", &self.api_version)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Messages API client. Built once at startup and shared.
#[derive(Clone)]
pub struct AnthropicClient {
    settings: ModelSettings,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicClient {
    pub fn new(mut settings: ModelSettings) -> Result<Self, PipelineError> {
        settings.base_url = settings.base_url.trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| PipelineError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    fn api_key(&self) -> Result<&str, PipelineError> {
        self.settings
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::Configuration(
                    "ANTHROPIC_API_KEY not configured in environment".to_string(),
                )
            })
    }
}

#[async_trait]
impl CompletionModel for AnthropicClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, PipelineError> {
        let api_key = self.api_key()?;
        let url = format!("{}/v1/messages", self.settings.base_url);

        let body = MessagesRequest {
            model: &self.settings.model,
            max_tokens: request.params.max_tokens,
            temperature: request.params.temperature,
            messages: [Message {
                role: "user",
                content: &request.prompt,
            }],
        };

        debug!(
            model = %self.settings.model,
            prompt = %request.fingerprint(),
            prompt_chars = request.prompt.len(),
            max_tokens = request.params.max_tokens,
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.settings.api_version)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::Transport(format!(
                        "Request timed out after {}s",
                        self.settings.request_timeout_secs
                    ))
                } else {
                    PipelineError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let body = response.text().await.unwrap_or_default();
            warn!(prompt = %request.fingerprint(), ?retry_after_secs, "Model provider rate limit hit");
            return Err(PipelineError::RateLimit {
                message: body,
                retry_after_secs,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Transport(format!("Failed to read model response: {e}")))?;

        let text = first_text_block(parsed)?;
        info!(
            prompt = %request.fingerprint(),
            response_chars = text.len(),
            "Completion received"
        );
        Ok(text)
    }

    fn model_id(&self) -> &str {
        &self.settings.model
    }
}

/// The answer must start with a text block; anything else means the API surface moved.
fn first_text_block(response: MessagesResponse) -> Result<String, PipelineError> {
    let block = response
        .content
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::UnexpectedResponseType("empty content".to_string()))?;

    match (block.kind.as_str(), block.text) {
        ("text", Some(text)) => Ok(text),
        (kind, _) => Err(PipelineError::UnexpectedResponseType(kind.to_string())),
    }
}

/// In-process model that replays queued outcomes in order and records every request.
pub struct ScriptedModel {
    outcomes: Mutex<VecDeque<Result<String, PipelineError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: impl Into<String>) -> Self {
        Self::new().then_reply(text)
    }

    pub fn then_reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()));
        self
    }

    pub fn then_fail(self, error: PipelineError) -> Self {
        self.push(Err(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn push(&self, outcome: Result<String, PipelineError>) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push_back(outcome);
        }
    }
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, PipelineError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        self.outcomes
            .lock()
            .ok()
            .and_then(|mut outcomes| outcomes.pop_front())
            .unwrap_or_else(|| Err(PipelineError::Transport("no scripted outcome left".into())))
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> MessagesResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn text_block_is_returned_verbatim() {
        let parsed = response(r#"{"id":"m1","content":[{"type":"text","text":"{\"a\":1}"}]}"#);
        assert_eq!(first_text_block(parsed).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn non_text_block_is_rejected() {
        let parsed = response(
            r#"{"content":[{"type":"tool_use","id":"t1","name":"x","input":{}}]}"#,
        );
        match first_text_block(parsed).unwrap_err() {
            PipelineError::UnexpectedResponseType(kind) => assert_eq!(kind, "tool_use"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_content_is_rejected() {
        let parsed = response(r#"{"content":[]}"#);
        assert!(matches!(
            first_text_block(parsed),
            Err(PipelineError::UnexpectedResponseType(_))
        ));
    }

    #[test]
    fn pipeline_budgets_are_fixed() {
        assert_eq!(ModelParams::EXTRACTION.max_tokens, 2048);
        assert_eq!(ModelParams::MATCHING.max_tokens, 4096);
        assert_eq!(ModelParams::FULL_PIPELINE.max_tokens, 8000);
        assert_eq!(ModelParams::MATCHING.temperature, 0.1);
    }

    #[test]
    fn request_body_is_a_single_user_turn() {
        let body = MessagesRequest {
            model: CLAUDE_MODEL,
            max_tokens: 2048,
            temperature: 0.2,
            messages: [Message {
                role: "user",
                content: "hello",
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], CLAUDE_MODEL);
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn settings_debug_hides_the_key() {
        let settings = ModelSettings {
            api_key: Some("sk-secret".into()),
            ..ModelSettings::default()
        };
        let printed = format!("{settings:?}");
        assert!(!printed.contains("sk-secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[tokio::test]
    async fn missing_credential_fails_at_call_time() {
        let client = AnthropicClient::new(ModelSettings::default()).unwrap();
        let request = CompletionRequest::new("prompt", ModelParams::EXTRACTION);
        let err = client.complete(&request).await.unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[tokio::test]
    async fn scripted_model_replays_in_order() {
        let model = ScriptedModel::replying("first")
            .then_fail(PipelineError::Transport("down".into()))
            .then_reply("third");
        let request = CompletionRequest::new("p", ModelParams::MATCHING);

        assert_eq!(model.complete(&request).await.unwrap(), "first");
        assert!(model.complete(&request).await.is_err());
        assert_eq!(model.complete(&request).await.unwrap(), "third");
        assert!(model.complete(&request).await.is_err());
        assert_eq!(model.calls(), 4);
        assert!(!model.health_check().await);
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let a = CompletionRequest::new("same prompt", ModelParams::EXTRACTION);
        let b = CompletionRequest::new("same prompt", ModelParams::FULL_PIPELINE);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 12);
    }
}
