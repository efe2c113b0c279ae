//! LLM provider implementations.
//!
//! Provides the Google Gemini implementation of `LlmProvider`. Use
//! `create_provider()` to instantiate the provider named in config.

pub mod gemini;

use crate::brain::{LlmProvider, MockLlmProvider};
use crate::config::LlmConfig;
use crate::error::LlmError;
use std::sync::Arc;

pub use gemini::GeminiProvider;

/// Create an LLM provider based on the configuration.
///
/// `"gemini"` builds a [`GeminiProvider`] (failing with `AuthFailed` when no
/// key can be found); `"mock"` builds an offline [`MockLlmProvider`].
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiProvider::new(config)?)),
        "mock" => Ok(Arc::new(MockLlmProvider::offline())),
        other => Err(LlmError::UnsupportedModel {
            model: format!("provider '{}'", other),
        }),
    }
}
