//! Brain module: LLM provider abstraction.
//!
//! Defines the `LlmProvider` trait for model-agnostic structured-output
//! completions and a `MockLlmProvider` for tests and offline sessions.

use crate::error::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// A single-prompt request whose reply must be JSON matching `schema`.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredRequest {
    pub prompt: String,
    /// Response schema in the provider's OpenAPI-subset dialect.
    pub schema: Value,
    /// Overrides the provider's configured model.
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<usize>,
    pub thinking_budget: Option<u32>,
}

impl StructuredRequest {
    pub fn new(prompt: impl Into<String>, schema: Value) -> Self {
        Self {
            prompt: prompt.into(),
            schema,
            model: None,
            temperature: None,
            max_output_tokens: None,
            thinking_budget: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_thinking_budget(mut self, budget: Option<u32>) -> Self {
        self.thinking_budget = budget;
        self
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    #[serde(default)]
    pub thinking_tokens: usize,
}

impl TokenUsage {
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens + self.thinking_tokens
    }
}

/// Raw reply of a structured completion. `text` is expected to be JSON but
/// is not parsed here.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredResponse {
    pub text: String,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: Option<String>,
}

/// Trait for LLM providers able to return schema-constrained JSON.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform one blocking completion and return the raw reply.
    async fn complete(&self, request: StructuredRequest) -> Result<StructuredResponse, LlmError>;

    /// Return the configured model name.
    fn model_name(&self) -> &str;

    /// Whether the provider enforces the response schema server-side.
    fn supports_structured_output(&self) -> bool {
        false
    }
}

/// A mock LLM provider for testing and offline use.
///
/// Replies are served from a FIFO queue. When the queue is empty an offline
/// provider synthesizes a placeholder reply for the request's schema; a
/// plain mock returns `LlmError::EmptyResponse`.
pub struct MockLlmProvider {
    model: String,
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<StructuredRequest>>,
    delay: Option<Duration>,
    offline: bool,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: None,
            offline: false,
        }
    }

    /// Mock that answers every request with a clearly labelled placeholder.
    pub fn offline() -> Self {
        Self {
            model: "offline".to_string(),
            offline: true,
            ..Self::new()
        }
    }

    /// Create a mock that returns `text` for the next call.
    pub fn with_response(text: &str) -> Self {
        let provider = Self::new();
        provider.queue_response(text);
        provider
    }

    /// Sleep before answering; used to exercise timeouts and cancellation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queue_response(&self, text: &str) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Ok(text.to_string()));
        }
    }

    pub fn queue_error(&self, error: LlmError) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Err(error));
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<StructuredRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn offline_reply(request: &StructuredRequest) -> String {
        let is_goal = request
            .schema
            .get("properties")
            .and_then(|p| p.get("suggestedReactants"))
            .is_some();
        if is_goal {
            serde_json::json!({
                "suggestedReactants": [],
                "suggestedTemp": 25,
                "suggestedPressure": 1.0,
                "rationale": "Offline mode: no model was consulted."
            })
            .to_string()
        } else {
            serde_json::json!({
                "products": [],
                "byproducts": [],
                "feasibilityScore": 0,
                "energyTrend": "Neutral",
                "mechanismInsight": "Offline mode: no model was consulted.",
                "approxTimeRequired": "n/a",
                "alternativeRoute": "n/a",
                "safetyAssessment": []
            })
            .to_string()
        }
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: StructuredRequest) -> Result<StructuredResponse, LlmError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        let text = match queued {
            Some(reply) => reply,
            None if self.offline => Ok(Self::offline_reply(&request)),
            None => Err(LlmError::EmptyResponse {
                finish_reason: "MOCK_QUEUE_EMPTY".to_string(),
            }),
        };

        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        Ok(StructuredResponse {
            text: text?,
            model: self.model.clone(),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
                thinking_tokens: 0,
            },
            finish_reason: Some("STOP".to_string()),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_serves_queue_in_order() {
        let provider = MockLlmProvider::new();
        provider.queue_response("{\"a\":1}");
        provider.queue_response("{\"a\":2}");

        let schema = serde_json::json!({"type": "OBJECT"});
        let first = provider
            .complete(StructuredRequest::new("one", schema.clone()))
            .await
            .unwrap();
        let second = provider
            .complete(StructuredRequest::new("two", schema))
            .await
            .unwrap();
        assert_eq!(first.text, "{\"a\":1}");
        assert_eq!(second.text, "{\"a\":2}");
        assert_eq!(provider.request_count(), 2);
        assert_eq!(provider.requests()[1].prompt, "two");
    }

    #[tokio::test]
    async fn test_mock_empty_queue_errors() {
        let provider = MockLlmProvider::new();
        let err = provider
            .complete(StructuredRequest::new("x", Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { .. }));
    }

    #[tokio::test]
    async fn test_mock_queued_error() {
        let provider = MockLlmProvider::new();
        provider.queue_error(LlmError::AuthFailed {
            provider: "Gemini".into(),
        });
        let err = provider
            .complete(StructuredRequest::new("x", Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::AuthFailed { .. }));
    }

    #[tokio::test]
    async fn test_offline_reply_matches_schema_kind() {
        let provider = MockLlmProvider::offline();
        let goal_schema = serde_json::json!({
            "type": "OBJECT",
            "properties": {"suggestedReactants": {"type": "ARRAY"}}
        });
        let reply = provider
            .complete(StructuredRequest::new("goal", goal_schema))
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&reply.text).unwrap();
        assert!(value["suggestedReactants"].is_array());

        let reply = provider
            .complete(StructuredRequest::new("sim", serde_json::json!({})))
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&reply.text).unwrap();
        assert_eq!(value["energyTrend"], "Neutral");
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
            thinking_tokens: 7,
        };
        assert_eq!(usage.total(), 22);
    }
}
