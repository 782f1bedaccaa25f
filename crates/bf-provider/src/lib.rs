//! Provider registry, routing policy, and dispatch (§4.G): tracks every
//! registered LLM endpoint's health and live metrics, scores candidates by
//! policy, and wraps the per-request chat-completion call with metrics
//! recording and one rediscovery retry.

pub mod policy;
pub mod registry;
pub mod router;
