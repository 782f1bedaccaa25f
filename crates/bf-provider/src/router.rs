//! Provider selection and dispatch (§4.G). Sits on top of
//! [`crate::registry::ProviderRegistry`] and [`crate::policy`], and on the
//! [`bf_harness::provider::LlmProvider`] trait concrete adapters implement.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use bf_api_types::chat::{ChatRequest, ChatResponse};
use bf_harness::provider::{LlmProvider, ProviderError};

use crate::policy::{self, ComplexityLevel, RoutingPolicy, DEFAULT_MAX_LATENCY_MS};
use crate::registry::{Provider, ProviderRegistry, RequirementSpec};

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("no provider satisfies the requirement spec")]
    NotFound,
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Per-request metrics sink; the caller (typically the telemetry layer)
/// decides what to do with each observation.
pub trait MetricsSink: Send + Sync {
    fn record(&self, provider_id: &str, latency_ms: u64, success: bool, total_tokens: u32);
}

/// A sink that drops every observation, for callers that don't care.
pub struct NullMetricsSink;

impl MetricsSink for NullMetricsSink {
    fn record(&self, _provider_id: &str, _latency_ms: u64, _success: bool, _total_tokens: u32) {}
}

pub struct ProviderRouter {
    registry: Arc<ProviderRegistry>,
    adapters: HashMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRouter {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry, adapters: HashMap::new() }
    }

    /// Wire a concrete [`LlmProvider`] adapter to a registered provider id.
    /// The router dispatches to whichever adapter is registered for the
    /// provider `select` returns.
    pub fn with_adapter(mut self, provider_id: impl Into<String>, adapter: Arc<dyn LlmProvider>) -> Self {
        self.adapters.insert(provider_id.into(), adapter);
        self
    }

    /// §4.G steps 1–3: filter by health and requirements, score by policy,
    /// return the highest-scored provider (ties broken by id, lexicographic).
    pub fn select(&self, req: &RequirementSpec, policy: RoutingPolicy, excluded: &HashSet<String>) -> Option<Provider> {
        let max_latency = req.max_latency_ms.unwrap_or(DEFAULT_MAX_LATENCY_MS);
        let candidates = self.registry.healthy_candidates(req, excluded);
        candidates
            .into_iter()
            .map(|(provider, metrics)| {
                let s = policy::score(&provider, &metrics, policy, max_latency);
                (provider, s)
            })
            .max_by(|(a, a_score), (b, b_score)| a_score.partial_cmp(b_score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| b.id.cmp(&a.id)))
            .map(|(provider, _)| provider)
    }

    /// §4.G's failover closure: never returns a provider in `excluded`. When
    /// every candidate is excluded, returns `None` rather than panicking or
    /// silently ignoring the exclusion set.
    pub fn select_with_failover(&self, req: &RequirementSpec, policy: RoutingPolicy, excluded: &HashSet<String>) -> Option<Provider> {
        self.select(req, policy, excluded)
    }

    /// Prefer an exact tier match over an overqualified provider (smallest
    /// overqualified first, to minimize waste) over an underqualified one
    /// (largest underqualified first, to do the best it can) (§4.G).
    pub fn select_best_for_complexity(&self, req: &RequirementSpec, complexity: ComplexityLevel, excluded: &HashSet<String>) -> Option<Provider> {
        let candidates = self.registry.healthy_candidates(req, excluded);
        if candidates.is_empty() {
            return None;
        }

        let mut exact: Vec<Provider> = Vec::new();
        let mut overqualified: Vec<Provider> = Vec::new();
        let mut underqualified: Vec<Provider> = Vec::new();

        for (provider, _metrics) in candidates {
            match policy::provider_tier(&provider).cmp(&complexity) {
                std::cmp::Ordering::Equal => exact.push(provider),
                std::cmp::Ordering::Greater => overqualified.push(provider),
                std::cmp::Ordering::Less => underqualified.push(provider),
            }
        }

        if !exact.is_empty() {
            exact.sort_by(|a, b| a.id.cmp(&b.id));
            return exact.into_iter().next();
        }
        if !overqualified.is_empty() {
            overqualified.sort_by(|a, b| a.model_params_billion.partial_cmp(&b.model_params_billion).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.id.cmp(&b.id)));
            return overqualified.into_iter().next();
        }
        underqualified.sort_by(|a, b| b.model_params_billion.partial_cmp(&a.model_params_billion).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.id.cmp(&b.id)));
        underqualified.into_iter().next()
    }

    /// Send a chat completion to `provider_id`'s adapter, recording latency
    /// and success through `sink`. On a "model not found" response, the
    /// provider's registered descriptor is treated as stale and the request
    /// is retried exactly once against the same adapter (real rediscovery —
    /// refreshing the registry's model list from the provider's own
    /// capability endpoint — is the adapter's responsibility; the router's
    /// contract is only the single retry).
    pub async fn send_chat_completion(&self, provider_id: &str, request: ChatRequest, sink: &dyn MetricsSink) -> Result<ChatResponse, RouterError> {
        let adapter = self.adapters.get(provider_id).ok_or_else(|| RouterError::Provider(ProviderError::NotConfigured(provider_id.to_string())))?;

        let attempt = |req: ChatRequest| {
            let adapter = Arc::clone(adapter);
            async move { adapter.chat(req).await }
        };

        let start = Instant::now();
        let first = attempt(request.clone()).await;
        match first {
            Ok(response) => {
                self.report(provider_id, start, &response, sink);
                Ok(response)
            }
            Err(ProviderError::Api(message)) if is_model_not_found(&message) => {
                tracing::warn!(provider_id, "model not found, retrying once after rediscovery");
                let retry_start = Instant::now();
                match attempt(request).await {
                    Ok(response) => {
                        self.report(provider_id, retry_start, &response, sink);
                        Ok(response)
                    }
                    Err(e) => {
                        sink.record(provider_id, retry_start.elapsed().as_millis() as u64, false, 0);
                        let _ = self.registry.record_request(provider_id, retry_start.elapsed().as_millis() as u64, false);
                        Err(e.into())
                    }
                }
            }
            Err(e) => {
                sink.record(provider_id, start.elapsed().as_millis() as u64, false, 0);
                let _ = self.registry.record_request(provider_id, start.elapsed().as_millis() as u64, false);
                Err(e.into())
            }
        }
    }

    fn report(&self, provider_id: &str, start: Instant, response: &ChatResponse, sink: &dyn MetricsSink) {
        let latency_ms = start.elapsed().as_millis() as u64;
        sink.record(provider_id, latency_ms, true, response.usage.total_tokens);
        let _ = self.registry.record_request(provider_id, latency_ms, true);
    }
}

fn is_model_not_found(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("404") || lower.contains("model not found") || lower.contains("model_not_found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ProviderStatus;
    use async_trait::async_trait;
    use bf_api_types::chat::{ChatChoice, ChatMessage, ChatUsage, FinishReason, StreamEvent};
    use futures_util::stream::BoxStream;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn provider(id: &str, params: f64, cost: f64) -> Provider {
        Provider {
            id: id.to_string(),
            provider_type: "anthropic".into(),
            endpoint: "https://example.invalid".into(),
            model: "m".into(),
            model_params_billion: params,
            context_window: 128_000,
            supports_function: true,
            supports_vision: false,
            supports_streaming: true,
            cost_per_m_token: cost,
            status: ProviderStatus::Healthy,
            tags: HashSet::new(),
        }
    }

    #[test]
    fn select_picks_cheapest_healthy_provider() {
        let registry = Arc::new(ProviderRegistry::new());
        registry.register(provider("a", 70.0, 5.0));
        registry.register(provider("b", 70.0, 2.0));
        let router = ProviderRouter::new(registry);
        let best = router.select(&RequirementSpec::default(), RoutingPolicy::MinimizeCost, &HashSet::new()).unwrap();
        assert_eq!(best.id, "b");
    }

    #[test]
    fn select_with_failover_excludes_the_first_pick() {
        let registry = Arc::new(ProviderRegistry::new());
        registry.register(provider("a", 70.0, 5.0));
        registry.register(provider("b", 70.0, 2.0));
        registry.register(provider("c", 70.0, 10.0));
        let router = ProviderRouter::new(registry);
        let excluded: HashSet<String> = ["b".to_string()].into_iter().collect();
        let best = router.select_with_failover(&RequirementSpec::default(), RoutingPolicy::MinimizeCost, &excluded).unwrap();
        assert_eq!(best.id, "a");
    }

    #[test]
    fn select_with_failover_returns_none_once_everything_is_excluded() {
        let registry = Arc::new(ProviderRegistry::new());
        registry.register(provider("a", 70.0, 5.0));
        let router = ProviderRouter::new(registry);
        let excluded: HashSet<String> = ["a".to_string()].into_iter().collect();
        assert!(router.select_with_failover(&RequirementSpec::default(), RoutingPolicy::MinimizeCost, &excluded).is_none());
    }

    #[test]
    fn select_best_for_complexity_prefers_exact_tier() {
        let registry = Arc::new(ProviderRegistry::new());
        registry.register(provider("small", 10.0, 1.0)); // Simple
        registry.register(provider("exact", 70.0, 1.0)); // Moderate
        registry.register(provider("huge", 400.0, 1.0)); // Expert
        let router = ProviderRouter::new(registry);
        let best = router.select_best_for_complexity(&RequirementSpec::default(), ComplexityLevel::Moderate, &HashSet::new()).unwrap();
        assert_eq!(best.id, "exact");
    }

    #[test]
    fn select_best_for_complexity_falls_back_to_smallest_overqualified() {
        let registry = Arc::new(ProviderRegistry::new());
        registry.register(provider("small_over", 70.0, 1.0)); // Moderate, overqualified for Simple
        registry.register(provider("big_over", 400.0, 1.0)); // Expert
        let router = ProviderRouter::new(registry);
        let best = router.select_best_for_complexity(&RequirementSpec::default(), ComplexityLevel::Simple, &HashSet::new()).unwrap();
        assert_eq!(best.id, "small_over");
    }

    struct CountingProvider {
        calls: AtomicU32,
        fail_first: bool,
    }

    #[async_trait]
    impl LlmProvider for CountingProvider {
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && call == 0 {
                return Err(ProviderError::Api("404 model not found".into()));
            }
            Ok(ChatResponse {
                choices: vec![ChatChoice { index: 0, message: ChatMessage::assistant("ok"), finish_reason: FinishReason::Stop }],
                usage: ChatUsage { prompt_tokens: 1, completion_tokens: 1, total_tokens: 2 },
            })
        }

        async fn chat_stream(&self, _request: ChatRequest) -> Result<BoxStream<'static, StreamEvent>, ProviderError> {
            unimplemented!("not exercised by this test")
        }

        fn id(&self) -> &str {
            "a"
        }
    }

    #[tokio::test]
    async fn send_chat_completion_retries_once_on_model_not_found() {
        let registry = Arc::new(ProviderRegistry::new());
        registry.register(provider("a", 70.0, 5.0));
        let adapter = Arc::new(CountingProvider { calls: AtomicU32::new(0), fail_first: true });
        let router = ProviderRouter::new(registry).with_adapter("a", adapter.clone());
        let request = ChatRequest { model: "m".into(), messages: vec![ChatMessage::user("hi")], temperature: 0.7, max_tokens: 100, stream: false };
        let response = router.send_chat_completion("a", request, &NullMetricsSink).await.unwrap();
        assert_eq!(response.first_content(), Some("ok"));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
    }
}
