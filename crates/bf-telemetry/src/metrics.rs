use ahash::AHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

// ---------------------------------------------------------------------------
// Histogram
// ---------------------------------------------------------------------------

/// Tracks the distribution of observed values across fixed bucket boundaries.
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<f64>,
    counts: Vec<AtomicU64>,
    sum_bits: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new(buckets: Vec<f64>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            sum_bits: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        loop {
            let current = self.sum_bits.load(Ordering::Relaxed);
            let new = f64::from_bits(current) + value;
            match self.sum_bits.compare_exchange_weak(
                current,
                new.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(_) => continue,
            }
        }
        for (i, boundary) in self.buckets.iter().enumerate() {
            if value <= *boundary {
                self.counts[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn sum(&self) -> f64 {
        f64::from_bits(self.sum_bits.load(Ordering::Relaxed))
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let c = self.count();
        if c == 0 {
            0.0
        } else {
            self.sum() / c as f64
        }
    }
}

fn latency_buckets_ms() -> Vec<f64> {
    vec![
        5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 30_000.0,
    ]
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Labels(Vec<(String, String)>);

impl Labels {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        let mut v: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        v.sort();
        Self(v)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// MetricsRegistry
// ---------------------------------------------------------------------------

/// Central, in-process metrics registry. Every long-running loop in the
/// orchestrator (dispatcher tick, heartbeat monitor, lock sweeper, provider
/// calls, workflow advances) reports into one shared instance.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: RwLock<AHashMap<(String, Labels), AtomicU64>>,
    gauges: RwLock<AHashMap<(String, Labels), AtomicU64>>,
    histograms: RwLock<AHashMap<(String, Labels), Histogram>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr_counter(&self, name: &str, labels: &[(&str, &str)]) {
        self.add_counter(name, labels, 1);
    }

    pub fn add_counter(&self, name: &str, labels: &[(&str, &str)], delta: u64) {
        let key = (name.to_string(), Labels::new(labels));
        let counters = self.counters.read().expect("counters lock poisoned");
        if let Some(c) = counters.get(&key) {
            c.fetch_add(delta, Ordering::Relaxed);
            return;
        }
        drop(counters);
        let mut counters = self.counters.write().expect("counters lock poisoned");
        counters
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(delta, Ordering::Relaxed);
    }

    pub fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: u64) {
        let key = (name.to_string(), Labels::new(labels));
        let gauges = self.gauges.read().expect("gauges lock poisoned");
        if let Some(g) = gauges.get(&key) {
            g.store(value, Ordering::Relaxed);
            return;
        }
        drop(gauges);
        let mut gauges = self.gauges.write().expect("gauges lock poisoned");
        gauges
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .store(value, Ordering::Relaxed);
    }

    pub fn observe_latency_ms(&self, name: &str, labels: &[(&str, &str)], value_ms: f64) {
        let key = (name.to_string(), Labels::new(labels));
        let histos = self.histograms.read().expect("histograms lock poisoned");
        if let Some(h) = histos.get(&key) {
            h.observe(value_ms);
            return;
        }
        drop(histos);
        let mut histos = self.histograms.write().expect("histograms lock poisoned");
        histos
            .entry(key)
            .or_insert_with(|| Histogram::new(latency_buckets_ms()))
            .observe(value_ms);
    }

    pub fn counter_value(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = (name.to_string(), Labels::new(labels));
        self.counters
            .read()
            .expect("counters lock poisoned")
            .get(&key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn gauge_value(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = (name.to_string(), Labels::new(labels));
        self.gauges
            .read()
            .expect("gauges lock poisoned")
            .get(&key)
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn histogram_mean_ms(&self, name: &str, labels: &[(&str, &str)]) -> f64 {
        let key = (name.to_string(), Labels::new(labels));
        self.histograms
            .read()
            .expect("histograms lock poisoned")
            .get(&key)
            .map(|h| h.mean())
            .unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Well-known metric names, kept in one place so components don't typo them.
// ---------------------------------------------------------------------------

pub mod names {
    pub const DISPATCH_TICK_DURATION_MS: &str = "dispatch_tick_duration_ms";
    pub const READY_SET_SIZE: &str = "ready_set_size";
    pub const CLAIM_CONTENTION_TOTAL: &str = "claim_contention_total";
    pub const PROVIDER_LATENCY_MS: &str = "provider_latency_ms";
    pub const PROVIDER_COST_USD_TOTAL: &str = "provider_cost_usd_total";
    pub const LOCK_CONTENTION_TOTAL: &str = "lock_contention_total";
    pub const WORKFLOW_ADVANCE_TOTAL: &str = "workflow_advance_total";
    pub const WORKER_HEARTBEAT_STALE_TOTAL: &str = "worker_heartbeat_stale_total";
    pub const EVENT_DEAD_LETTER_TOTAL: &str = "event_dead_letter_total";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates() {
        let reg = MetricsRegistry::new();
        reg.incr_counter("x", &[("a", "1")]);
        reg.incr_counter("x", &[("a", "1")]);
        assert_eq!(reg.counter_value("x", &[("a", "1")]), 2);
    }

    #[test]
    fn counter_distinguishes_labels() {
        let reg = MetricsRegistry::new();
        reg.incr_counter("x", &[("project", "p1")]);
        reg.incr_counter("x", &[("project", "p2")]);
        assert_eq!(reg.counter_value("x", &[("project", "p1")]), 1);
        assert_eq!(reg.counter_value("x", &[("project", "p2")]), 1);
    }

    #[test]
    fn gauge_overwrites() {
        let reg = MetricsRegistry::new();
        reg.set_gauge("ready", &[], 3);
        reg.set_gauge("ready", &[], 7);
        assert_eq!(reg.gauge_value("ready", &[]), 7);
    }

    #[test]
    fn histogram_mean() {
        let reg = MetricsRegistry::new();
        reg.observe_latency_ms("lat", &[], 10.0);
        reg.observe_latency_ms("lat", &[], 20.0);
        assert_eq!(reg.histogram_mean_ms("lat", &[]), 15.0);
    }

    #[test]
    fn label_order_does_not_matter() {
        let a = Labels::new(&[("x", "1"), ("y", "2")]);
        let b = Labels::new(&[("y", "2"), ("x", "1")]);
        assert_eq!(a, b);
    }
}
