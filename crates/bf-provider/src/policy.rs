//! Scoring policies (§4.G step 2) and the complexity-tier preference used by
//! `selectBestForComplexity`. Grounded in `at-intelligence::model_router`'s
//! `RoutingStrategy`/`ComplexityLevel` shape, adapted from "pick a model
//! tier" to "score a registered provider."

use serde::{Deserialize, Serialize};

use crate::registry::{Provider, ProviderMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPolicy {
    MinimizeCost,
    MinimizeLatency,
    MaximizeQuality,
    Balanced,
}

/// Cost score: inverse log of cost-per-million-tokens. Free providers score
/// the maximum; cost grows the score shrinks, but never goes negative for
/// any realistic price.
fn cost_score(provider: &Provider) -> f64 {
    1.0 / (1.0 + (1.0 + provider.cost_per_m_token.max(0.0)).ln())
}

/// Latency score: `1 - latency/maxLatency`, clamped to `[0, 1]`. A provider
/// with no observed latency yet (new registration) scores neutrally at 0.5
/// rather than winning or losing purely on inexperience.
fn latency_score(metrics: &ProviderMetrics, max_latency_ms: f64) -> f64 {
    if metrics.avg_request_latency_ms == 0.0 {
        return 0.5;
    }
    (1.0 - metrics.avg_request_latency_ms / max_latency_ms).clamp(0.0, 1.0)
}

/// Quality score: weights log(params), context window, and capability
/// flags. Larger, longer-context, more-capable providers score higher.
fn quality_score(provider: &Provider) -> f64 {
    let param_score = (1.0 + provider.model_params_billion.max(0.0)).ln() / (1.0 + 1000f64.ln());
    let context_score = (provider.context_window as f64 / 1_000_000.0).min(1.0);
    let capability_score = [provider.supports_function, provider.supports_vision, provider.supports_streaming]
        .iter()
        .filter(|v| **v)
        .count() as f64
        / 3.0;
    (0.5 * param_score + 0.3 * context_score + 0.2 * capability_score).clamp(0.0, 1.0)
}

/// Default latency ceiling used for latency scoring when the caller's
/// requirement spec doesn't set one.
pub const DEFAULT_MAX_LATENCY_MS: f64 = 10_000.0;

pub fn score(provider: &Provider, metrics: &ProviderMetrics, policy: RoutingPolicy, max_latency_ms: f64) -> f64 {
    let cost = cost_score(provider);
    let latency = latency_score(metrics, max_latency_ms);
    let quality = quality_score(provider);
    match policy {
        RoutingPolicy::MinimizeCost => cost,
        RoutingPolicy::MinimizeLatency => latency,
        RoutingPolicy::MaximizeQuality => quality,
        RoutingPolicy::Balanced => 0.3 * cost + 0.3 * latency + 0.4 * quality,
    }
}

/// Coarse complexity tiers, ordered, used only to compare a bead's required
/// complexity against a provider's capacity (mirrors
/// `at-intelligence::model_router::ComplexityLevel`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Trivial,
    Simple,
    Moderate,
    Complex,
    Expert,
}

/// Bucket a provider's capacity into the same tiers by parameter count —
/// larger models are assumed able to handle more complex work.
pub fn provider_tier(provider: &Provider) -> ComplexityLevel {
    let params = provider.model_params_billion;
    if params < 5.0 {
        ComplexityLevel::Trivial
    } else if params < 20.0 {
        ComplexityLevel::Simple
    } else if params < 70.0 {
        ComplexityLevel::Moderate
    } else if params < 300.0 {
        ComplexityLevel::Complex
    } else {
        ComplexityLevel::Expert
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn provider(params: f64, cost: f64) -> Provider {
        Provider {
            id: "p".into(),
            provider_type: "t".into(),
            endpoint: "e".into(),
            model: "m".into(),
            model_params_billion: params,
            context_window: 128_000,
            supports_function: true,
            supports_vision: true,
            supports_streaming: true,
            cost_per_m_token: cost,
            status: crate::registry::ProviderStatus::Healthy,
            tags: HashSet::new(),
        }
    }

    #[test]
    fn cheaper_provider_scores_higher_under_minimize_cost() {
        let cheap = provider(70.0, 1.0);
        let pricey = provider(70.0, 50.0);
        let metrics = ProviderMetrics::default();
        let cheap_score = score(&cheap, &metrics, RoutingPolicy::MinimizeCost, DEFAULT_MAX_LATENCY_MS);
        let pricey_score = score(&pricey, &metrics, RoutingPolicy::MinimizeCost, DEFAULT_MAX_LATENCY_MS);
        assert!(cheap_score > pricey_score);
    }

    #[test]
    fn bigger_model_scores_higher_under_maximize_quality() {
        let small = provider(3.0, 5.0);
        let big = provider(400.0, 5.0);
        let metrics = ProviderMetrics::default();
        let small_score = score(&small, &metrics, RoutingPolicy::MaximizeQuality, DEFAULT_MAX_LATENCY_MS);
        let big_score = score(&big, &metrics, RoutingPolicy::MaximizeQuality, DEFAULT_MAX_LATENCY_MS);
        assert!(big_score > small_score);
    }

    #[test]
    fn provider_tier_buckets_by_param_count() {
        assert_eq!(provider_tier(&provider(2.0, 1.0)), ComplexityLevel::Trivial);
        assert_eq!(provider_tier(&provider(70.0, 1.0)), ComplexityLevel::Moderate);
        assert_eq!(provider_tier(&provider(400.0, 1.0)), ComplexityLevel::Expert);
    }
}
