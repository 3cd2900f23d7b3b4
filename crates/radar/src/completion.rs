//! AI completion capability.
//!
//! Detectors may ask an external model for recommendation text. The provider
//! is opaque to the core: one prompt in, one block of text out.

use async_trait::async_trait;

use crate::error::CompletionError;

/// Opaque text-completion capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &'static str;

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Provider used when no model is configured. Always fails, so callers fall
/// back to their canned text.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledCompletion;

#[async_trait]
impl CompletionProvider for DisabledCompletion {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
        Err(CompletionError::NotConfigured)
    }
}

/// Provider that answers every prompt with the same text.
#[derive(Debug, Clone)]
pub struct StaticCompletion {
    response: String,
}

impl StaticCompletion {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

#[async_trait]
impl CompletionProvider for StaticCompletion {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
        Ok(self.response.clone())
    }
}

/// Ask the provider for a recommendation, trimming the reply and falling back
/// to `fallback` on error or empty output.
pub async fn recommend(provider: &dyn CompletionProvider, prompt: &str, fallback: &str) -> String {
    match provider.complete(prompt).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => fallback.to_string(),
        Err(e) => {
            tracing::debug!(provider = provider.name(), error = %e, "Completion unavailable, using fallback");
            fallback.to_string()
        }
    }
}
