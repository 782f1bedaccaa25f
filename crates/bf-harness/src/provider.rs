//! LLM provider abstraction (§6). Concrete providers (Anthropic, OpenAI,
//! Ollama, ...) live outside this crate; this defines the trait every
//! provider adapter implements and a stub used until one is configured.
//!
//! Unlike a direct API client, this trait speaks `bf-api-types::chat`'s
//! wire-agnostic request/response shapes, not a provider's native format —
//! `bf-provider`'s router picks a concrete implementation per request and
//! adapts the chosen provider's own format onto this contract.

use async_trait::async_trait;
use bf_api_types::chat::{ChatRequest, ChatResponse, StreamEvent};
use futures_util::stream::BoxStream;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider not configured: {0}")]
    NotConfigured(String),
    #[error("api error: {0}")]
    Api(String),
    #[error("rate limited - retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("request timed out")]
    Timeout,
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request and wait for the full response.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Send a chat completion request and stream incremental content.
    /// Implementations that don't support streaming can synthesize a
    /// single-chunk stream from [`LlmProvider::chat`].
    async fn chat_stream(
        &self,
        request: ChatRequest,
    ) -> Result<BoxStream<'static, StreamEvent>, ProviderError>;

    /// Provider id as it appears in config and routing decisions (e.g.
    /// "anthropic", "openai", "ollama").
    fn id(&self) -> &str;

    /// Rough per-1k-token cost in USD cents, used by the cost-weighted
    /// scoring policy. `None` means cost is unknown and should be treated
    /// as the worst case by a cost-sensitive policy.
    fn cost_per_1k_tokens(&self) -> Option<f64> {
        None
    }
}

/// Returns `NotConfigured` for every call. Used as a placeholder until a
/// concrete adapter is wired up for a provider id.
#[derive(Debug, Clone)]
pub struct StubProvider {
    provider_id: String,
}

impl StubProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self { provider_id: id.into() }
    }
}

#[async_trait]
impl LlmProvider for StubProvider {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "{} provider is not configured - install a concrete adapter",
            self.provider_id
        )))
    }

    async fn chat_stream(
        &self,
        _request: ChatRequest,
    ) -> Result<BoxStream<'static, StreamEvent>, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "{} provider is not configured - install a concrete adapter",
            self.provider_id
        )))
    }

    fn id(&self) -> &str {
        &self.provider_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bf_api_types::chat::{ChatMessage, ChatRequest};

    #[tokio::test]
    async fn stub_provider_reports_not_configured() {
        let provider = StubProvider::new("anthropic");
        let request = ChatRequest {
            model: "claude".into(),
            messages: vec![ChatMessage::user("hi")],
            temperature: 0.7,
            max_tokens: 100,
            stream: false,
        };
        let result = provider.chat(request).await;
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));
        assert_eq!(provider.id(), "anthropic");
    }
}
