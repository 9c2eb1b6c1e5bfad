//! Metrics: named counters plus bounded latency reservoirs with p50/p95,
//! queryable as one JSON snapshot.
//!
//! Counters are lock-free; each histogram keeps the most recent samples in a
//! small ring so percentiles reflect recent behaviour without unbounded
//! memory.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;
use serde_json::{json, Value};

const RESERVOIR_CAP: usize = 512;

struct Reservoir {
    samples: Vec<u64>,
    next: usize,
    count: u64,
}

impl Reservoir {
    fn new() -> Self {
        Self {
            samples: Vec::with_capacity(RESERVOIR_CAP),
            next: 0,
            count: 0,
        }
    }

    fn observe(&mut self, value: u64) {
        self.count += 1;
        if self.samples.len() < RESERVOIR_CAP {
            self.samples.push(value);
        } else {
            self.samples[self.next] = value;
            self.next = (self.next + 1) % RESERVOIR_CAP;
        }
    }

    fn percentile(sorted: &[u64], p: f64) -> u64 {
        if sorted.is_empty() {
            return 0;
        }
        let rank = ((sorted.len() as f64 - 1.0) * p).round() as usize;
        sorted[rank.min(sorted.len() - 1)]
    }

    fn summary(&self) -> Value {
        let mut sorted = self.samples.clone();
        sorted.sort_unstable();
        json!({
            "count": self.count,
            "p50_ms": Self::percentile(&sorted, 0.50),
            "p95_ms": Self::percentile(&sorted, 0.95),
            "max_ms": sorted.last().copied().unwrap_or(0),
        })
    }
}

#[derive(Default)]
pub struct Metrics {
    counters: DashMap<String, AtomicU64>,
    histograms: DashMap<String, Mutex<Reservoir>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&self, name: &str) {
        self.add(name, 1);
    }

    pub fn add(&self, name: &str, delta: u64) {
        self.counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(delta, Ordering::Relaxed);
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn observe_ms(&self, name: &str, value_ms: u64) {
        self.histograms
            .entry(name.to_string())
            .or_insert_with(|| Mutex::new(Reservoir::new()))
            .lock()
            .expect("metrics lock")
            .observe(value_ms);
    }

    /// Read-only JSON snapshot of all counters and histogram summaries.
    pub fn snapshot(&self) -> Value {
        let mut counters = serde_json::Map::new();
        for entry in self.counters.iter() {
            counters.insert(
                entry.key().clone(),
                json!(entry.value().load(Ordering::Relaxed)),
            );
        }
        let mut histograms = serde_json::Map::new();
        for entry in self.histograms.iter() {
            histograms.insert(
                entry.key().clone(),
                entry.value().lock().expect("metrics lock").summary(),
            );
        }
        json!({
            "counters": Value::Object(counters),
            "histograms": Value::Object(histograms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = Metrics::new();
        m.incr("tool.send_email.invocations");
        m.add("tool.send_email.invocations", 2);
        assert_eq!(m.counter("tool.send_email.invocations"), 3);
        assert_eq!(m.counter("missing"), 0);
    }

    #[test]
    fn percentiles_over_known_distribution() {
        let m = Metrics::new();
        for v in 1..=100u64 {
            m.observe_ms("stage.plan.latency", v);
        }
        let snap = m.snapshot();
        let h = &snap["histograms"]["stage.plan.latency"];
        assert_eq!(h["count"], 100);
        let p50 = h["p50_ms"].as_u64().unwrap();
        assert!((49..=51).contains(&p50), "p50 was {p50}");
        let p95 = h["p95_ms"].as_u64().unwrap();
        assert!((94..=96).contains(&p95), "p95 was {p95}");
        assert_eq!(h["max_ms"], 100);
    }

    #[test]
    fn reservoir_is_bounded() {
        let m = Metrics::new();
        for v in 0..10_000u64 {
            m.observe_ms("hot", v);
        }
        let snap = m.snapshot();
        assert_eq!(snap["histograms"]["hot"]["count"], 10_000);
        // Ring keeps the most recent window, so the max stays near the tail.
        assert!(snap["histograms"]["hot"]["max_ms"].as_u64().unwrap() >= 9_000);
    }

    #[test]
    fn snapshot_is_json_object() {
        let m = Metrics::new();
        m.incr("a");
        let snap = m.snapshot();
        assert!(snap["counters"].is_object());
        assert!(snap["histograms"].is_object());
    }
}
