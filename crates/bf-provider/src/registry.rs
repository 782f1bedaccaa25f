//! Provider registry (§4.G, §6): the set of providers known to the system,
//! each with live metrics updated under its own entry lock. Mirrors the
//! dashmap-per-key pattern used for bead/lock state elsewhere in the
//! workspace — snapshot reads stay cheap even while a heartbeat or a
//! completed request is updating one entry.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Active,
    Healthy,
    Unhealthy,
    Disabled,
}

impl ProviderStatus {
    fn is_operational(self) -> bool {
        matches!(self, ProviderStatus::Active | ProviderStatus::Healthy)
    }
}

/// Static descriptor for an LLM endpoint (§3's Provider entity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub provider_type: String,
    pub endpoint: String,
    pub model: String,
    pub model_params_billion: f64,
    pub context_window: u32,
    pub supports_function: bool,
    pub supports_vision: bool,
    pub supports_streaming: bool,
    pub cost_per_m_token: f64,
    pub status: ProviderStatus,
    pub tags: HashSet<String>,
}

/// Mutable metrics tracked per provider, updated after every request and
/// every heartbeat probe.
#[derive(Debug, Clone)]
pub struct ProviderMetrics {
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub last_heartbeat_latency_ms: Option<u64>,
    pub avg_request_latency_ms: f64,
    pub success_count: u64,
    pub failure_count: u64,
}

impl Default for ProviderMetrics {
    fn default() -> Self {
        Self {
            last_heartbeat_at: None,
            last_heartbeat_latency_ms: None,
            avg_request_latency_ms: 0.0,
            success_count: 0,
            failure_count: 0,
        }
    }
}

impl ProviderMetrics {
    pub fn sample_count(&self) -> u64 {
        self.success_count + self.failure_count
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.sample_count();
        if total == 0 {
            1.0
        } else {
            self.success_count as f64 / total as f64
        }
    }

    fn record(&mut self, latency_ms: u64, success: bool) {
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        // Exponential moving average so one slow request doesn't dominate
        // the score forever.
        const ALPHA: f64 = 0.2;
        if self.avg_request_latency_ms == 0.0 {
            self.avg_request_latency_ms = latency_ms as f64;
        } else {
            self.avg_request_latency_ms = ALPHA * latency_ms as f64 + (1.0 - ALPHA) * self.avg_request_latency_ms;
        }
    }
}

/// What an operation requires of a provider before scoring even runs (§4.G).
#[derive(Debug, Clone, Default)]
pub struct RequirementSpec {
    pub max_cost_per_m_token: Option<f64>,
    pub max_latency_ms: Option<f64>,
    pub min_context_window: Option<u32>,
    pub requires_function: bool,
    pub requires_vision: bool,
    pub required_tags: HashSet<String>,
}

impl RequirementSpec {
    fn is_met_by(&self, provider: &Provider) -> bool {
        if let Some(max_cost) = self.max_cost_per_m_token {
            if provider.cost_per_m_token > max_cost {
                return false;
            }
        }
        if let Some(min_ctx) = self.min_context_window {
            if provider.context_window < min_ctx {
                return false;
            }
        }
        if self.requires_function && !provider.supports_function {
            return false;
        }
        if self.requires_vision && !provider.supports_vision {
            return false;
        }
        if !self.required_tags.is_subset(&provider.tags) {
            return false;
        }
        true
    }
}

/// A provider that heartbeats less often than this is never considered
/// healthy regardless of its reported status (§4.H's 3× staleness rule,
/// reused here for provider liveness).
const HEARTBEAT_FRESHNESS: Duration = Duration::from_secs(90);

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown provider: {0}")]
    Unknown(String),
}

/// Live set of registered providers plus their metrics.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: DashMap<String, (Provider, ProviderMetrics)>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, provider: Provider) {
        self.providers.entry(provider.id.clone()).or_insert_with(|| (provider.clone(), ProviderMetrics::default())).0 = provider;
    }

    pub fn deregister(&self, id: &str) {
        self.providers.remove(id);
    }

    pub fn get(&self, id: &str) -> Option<Provider> {
        self.providers.get(id).map(|entry| entry.0.clone())
    }

    pub fn metrics(&self, id: &str) -> Option<ProviderMetrics> {
        self.providers.get(id).map(|entry| entry.1.clone())
    }

    pub fn record_heartbeat(&self, id: &str, latency_ms: u64) -> Result<(), RegistryError> {
        let mut entry = self.providers.get_mut(id).ok_or_else(|| RegistryError::Unknown(id.to_string()))?;
        entry.1.last_heartbeat_at = Some(Utc::now());
        entry.1.last_heartbeat_latency_ms = Some(latency_ms);
        Ok(())
    }

    pub fn record_request(&self, id: &str, latency_ms: u64, success: bool) -> Result<(), RegistryError> {
        let mut entry = self.providers.get_mut(id).ok_or_else(|| RegistryError::Unknown(id.to_string()))?;
        entry.1.record(latency_ms, success);
        Ok(())
    }

    /// Snapshot of every provider currently meeting the health gate: status
    /// active/healthy, heartbeat fresh, and success rate above 50% once at
    /// least 10 samples have accumulated (§4.G step 1).
    pub fn healthy_candidates(&self, req: &RequirementSpec, excluded: &HashSet<String>) -> Vec<(Provider, ProviderMetrics)> {
        let now = Utc::now();
        self.providers
            .iter()
            .filter(|entry| !excluded.contains(entry.key()))
            .filter_map(|entry| {
                let (provider, metrics) = entry.value();
                if !provider.status.is_operational() {
                    return None;
                }
                if let Some(last) = metrics.last_heartbeat_at {
                    let age = (now - last).to_std().unwrap_or(Duration::MAX);
                    if age > HEARTBEAT_FRESHNESS {
                        return None;
                    }
                }
                if metrics.sample_count() >= 10 && metrics.success_rate() <= 0.5 {
                    return None;
                }
                if !req.is_met_by(provider) {
                    return None;
                }
                Some((provider.clone(), metrics.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(id: &str, cost: f64) -> Provider {
        Provider {
            id: id.to_string(),
            provider_type: "anthropic".into(),
            endpoint: "https://example.invalid".into(),
            model: "test-model".into(),
            model_params_billion: 70.0,
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
    fn unhealthy_status_is_excluded() {
        let registry = ProviderRegistry::new();
        let mut p = provider("a", 5.0);
        p.status = ProviderStatus::Unhealthy;
        registry.register(p);
        let candidates = registry.healthy_candidates(&RequirementSpec::default(), &HashSet::new());
        assert!(candidates.is_empty());
    }

    #[test]
    fn low_success_rate_excludes_after_ten_samples() {
        let registry = ProviderRegistry::new();
        registry.register(provider("a", 5.0));
        for _ in 0..6 {
            registry.record_request("a", 100, true).unwrap();
        }
        for _ in 0..5 {
            registry.record_request("a", 100, false).unwrap();
        }
        let candidates = registry.healthy_candidates(&RequirementSpec::default(), &HashSet::new());
        assert!(candidates.is_empty());
    }

    #[test]
    fn excluded_set_removes_a_candidate() {
        let registry = ProviderRegistry::new();
        registry.register(provider("a", 5.0));
        registry.register(provider("b", 2.0));
        let excluded: HashSet<String> = ["a".to_string()].into_iter().collect();
        let candidates = registry.healthy_candidates(&RequirementSpec::default(), &excluded);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].0.id, "b");
    }

    #[test]
    fn requirement_on_context_window_filters_out_too_small() {
        let registry = ProviderRegistry::new();
        registry.register(provider("a", 5.0));
        let req = RequirementSpec { min_context_window: Some(200_000), ..Default::default() };
        let candidates = registry.healthy_candidates(&req, &HashSet::new());
        assert!(candidates.is_empty());
    }
}
