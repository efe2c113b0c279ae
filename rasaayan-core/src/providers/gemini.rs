//! Google Gemini API provider.
//!
//! Implements `LlmProvider` for Gemini `generateContent` with a response
//! schema, so the model's reply is a single JSON document.

use crate::brain::{LlmProvider, StructuredRequest, StructuredResponse, TokenUsage};
use crate::config::LlmConfig;
use crate::error::LlmError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

/// The default Google Gemini API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Secondary environment variable checked for a key.
const FALLBACK_KEY_ENV: &str = "API_KEY";

/// How authentication is performed against the Gemini API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GeminiAuthMode {
    /// Traditional API key via `?key=` query parameter.
    ApiKey,
    /// OAuth Bearer token via `Authorization` header.
    Bearer,
}

/// Google Gemini API provider.
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_output_tokens: Option<usize>,
    auth_mode: GeminiAuthMode,
}

impl GeminiProvider {
    /// Create a new Gemini provider from configuration.
    ///
    /// The key comes from `config.api_key`, then the variable named by
    /// `config.api_key_env`, then `API_KEY`. Returns `LlmError::AuthFailed`
    /// if none is set.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(&config.api_key_env).ok())
            .or_else(|| std::env::var(FALLBACK_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::AuthFailed {
                provider: format!("Gemini (env var '{}' not set)", config.api_key_env),
            })?;
        Self::new_with_key(config, api_key)
    }

    /// Create a new Gemini provider with an explicitly provided API key.
    pub fn new_with_key(config: &LlmConfig, api_key: String) -> Result<Self, LlmError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::Connection {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        let auth_mode = if config.auth_method == "oauth" {
            GeminiAuthMode::Bearer
        } else {
            GeminiAuthMode::ApiKey
        };

        Ok(Self {
            client,
            base_url,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            auth_mode,
        })
    }

    /// Build the JSON request body for `generateContent`.
    ///
    /// Request-level settings win over the provider's configured ones.
    /// Unset temperature and output cap are left to the model's defaults;
    /// thinking tokens count against `maxOutputTokens`. A thinking budget of
    /// zero or `None` omits `thinkingConfig`.
    fn build_request_body(&self, request: &StructuredRequest) -> Value {
        let mut generation_config = json!({
            "responseMimeType": "application/json",
            "responseSchema": Self::sanitize_schema(&request.schema),
        });

        if let Some(temperature) = request.temperature.or(self.temperature) {
            generation_config["temperature"] = json!(temperature);
        }
        if let Some(max) = request.max_output_tokens.or(self.max_output_tokens) {
            generation_config["maxOutputTokens"] = json!(max);
        }

        if let Some(budget) = request.thinking_budget.filter(|b| *b > 0) {
            generation_config["thinkingConfig"] = json!({ "thinkingBudget": budget });
        }

        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }]
            }],
            "generationConfig": generation_config,
        })
    }

    /// Recursively strip JSON Schema fields that the Gemini API does not support.
    ///
    /// Gemini response schemas support: `type`, `description`, `properties`,
    /// `required`, `enum`, `items`, `format`, `nullable`.
    /// Everything else (e.g., `additionalProperties`, `default`, `$schema`,
    /// `title`, `minimum`, `maximum`) is removed.
    fn sanitize_schema(schema: &Value) -> Value {
        const ALLOWED_KEYS: &[&str] = &[
            "type",
            "description",
            "properties",
            "required",
            "enum",
            "items",
            "format",
            "nullable",
        ];

        match schema {
            Value::Object(map) => {
                let mut clean = serde_json::Map::new();
                for (key, value) in map {
                    if !ALLOWED_KEYS.contains(&key.as_str()) {
                        continue;
                    }
                    let cleaned_value = match key.as_str() {
                        "properties" => {
                            if let Value::Object(props) = value {
                                let cleaned_props: serde_json::Map<String, Value> = props
                                    .iter()
                                    .map(|(k, v)| (k.clone(), Self::sanitize_schema(v)))
                                    .collect();
                                Value::Object(cleaned_props)
                            } else {
                                value.clone()
                            }
                        }
                        "items" => Self::sanitize_schema(value),
                        _ => value.clone(),
                    };
                    clean.insert(key.clone(), cleaned_value);
                }
                Value::Object(clean)
            }
            other => other.clone(),
        }
    }

    /// Parse a Gemini API response JSON into a `StructuredResponse`.
    ///
    /// Text parts are concatenated in order; parts flagged `thought` carry
    /// the model's reasoning summary and are skipped.
    fn parse_response(body: &Value, fallback_model: &str) -> Result<StructuredResponse, LlmError> {
        let candidates = body["candidates"]
            .as_array()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "Missing 'candidates' array in response".to_string(),
            })?;

        let candidate = candidates.first().ok_or_else(|| LlmError::ResponseParse {
            message: "Empty 'candidates' array in response".to_string(),
        })?;

        let finish_reason = candidate["finishReason"].as_str().map(|s| s.to_string());

        let text: String = candidate["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter(|p| !p["thought"].as_bool().unwrap_or(false))
                    .filter_map(|p| p["text"].as_str())
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse {
                finish_reason: finish_reason.unwrap_or_else(|| "UNKNOWN".to_string()),
            });
        }

        let usage_metadata = &body["usageMetadata"];
        let usage = TokenUsage {
            input_tokens: usage_metadata["promptTokenCount"].as_u64().unwrap_or(0) as usize,
            output_tokens: usage_metadata["candidatesTokenCount"].as_u64().unwrap_or(0) as usize,
            thinking_tokens: usage_metadata["thoughtsTokenCount"].as_u64().unwrap_or(0) as usize,
        };

        let model = body["modelVersion"]
            .as_str()
            .unwrap_or(fallback_model)
            .to_string();

        Ok(StructuredResponse {
            text,
            model,
            usage,
            finish_reason,
        })
    }

    /// Map an HTTP status code to the appropriate `LlmError`.
    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> LlmError {
        match status.as_u16() {
            401 | 403 => LlmError::AuthFailed {
                provider: "Gemini".to_string(),
            },
            429 => LlmError::RateLimited {
                retry_after_secs: 30,
            },
            500..=599 => LlmError::Connection {
                message: format!("HTTP {} from Gemini API", status),
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {} from Gemini API: {}", status, body_text),
            },
        }
    }

    /// Build the endpoint URL for a Gemini API call.
    ///
    /// In `ApiKey` mode, the key is appended as a `?key=` query parameter.
    /// In `Bearer` mode, the URL contains no key (auth is via header).
    fn endpoint_url(&self, model: &str, method: &str) -> String {
        match self.auth_mode {
            GeminiAuthMode::ApiKey => {
                format!(
                    "{}/models/{}:{}?key={}",
                    self.base_url, model, method, self.api_key
                )
            }
            GeminiAuthMode::Bearer => {
                format!("{}/models/{}:{}", self.base_url, model, method)
            }
        }
    }

    /// Build a request with the appropriate auth header/params.
    fn build_authed_request(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(url)
            .header("content-type", "application/json");
        match self.auth_mode {
            GeminiAuthMode::ApiKey => builder,
            GeminiAuthMode::Bearer => {
                builder.header("Authorization", format!("Bearer {}", self.api_key))
            }
        }
    }

    /// One HTTP round trip. Failures are returned to the caller as-is.
    async fn send_once(
        &self,
        url: &str,
        body: &Value,
        model: &str,
    ) -> Result<StructuredResponse, LlmError> {
        let response = self
            .build_authed_request(url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    LlmError::Connection {
                        message: format!("Request to Gemini API failed: {}", e),
                    }
                } else {
                    LlmError::ApiRequest {
                        message: format!("Request to Gemini API failed: {}", e),
                    }
                }
            })?;

        let status = response.status();
        let body_text = response.text().await.map_err(|e| LlmError::ResponseParse {
            message: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON in response: {}", e),
            })?;

        Self::parse_response(&response_json, model)
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(&self, request: StructuredRequest) -> Result<StructuredResponse, LlmError> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let body = self.build_request_body(&request);
        let url = self.endpoint_url(model, "generateContent");

        debug!(
            model = model,
            prompt_chars = request.prompt.len(),
            thinking_budget = ?request.thinking_budget,
            "Sending Gemini structured completion request"
        );

        let response = self.send_once(&url, &body, model).await;

        match &response {
            Ok(resp) => debug!(
                model = resp.model.as_str(),
                input_tokens = resp.usage.input_tokens,
                output_tokens = resp.usage.output_tokens,
                thinking_tokens = resp.usage.thinking_tokens,
                "Gemini completion finished"
            ),
            Err(e) => warn!(model = model, error = %e, "Gemini completion failed"),
        }
        response
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn supports_structured_output(&self) -> bool {
        true
    }
}
