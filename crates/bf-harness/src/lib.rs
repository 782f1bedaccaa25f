//! Execution harness shared by every worker: the action router, the
//! `edit_code`/envelope parsers it depends on, and the ambient
//! security/rate-limiting/circuit-breaking/shutdown-coordination plumbing
//! that wraps a worker's outbound calls.

pub mod circuit_breaker;
pub mod edit_match;
pub mod envelope;
pub mod provider;
pub mod rate_limiter;
pub mod router;
pub mod security;
pub mod shutdown;
