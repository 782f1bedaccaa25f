//! Ambient observability for the orchestrator: structured logging, an
//! in-process metrics registry, and span/trace-id helpers. None of this is
//! named by spec.md directly — it is the ambient stack every component
//! (dispatcher tick, provider router, workflow advance, lock manager) reports
//! into, the way `at-telemetry` backs the teacher's daemon.

pub mod logging;
pub mod metrics;
pub mod tracing_setup;

pub use metrics::MetricsRegistry;
