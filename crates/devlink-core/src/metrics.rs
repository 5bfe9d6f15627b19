// ── Connection metrics ──
//
// Process-scoped counters keyed by adaptor name. Injected into the
// reconciler as an `Arc` so tests can observe them in isolation.

use std::collections::BTreeMap;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

/// Upper bounds (seconds) of the send latency histogram buckets.
pub const SEND_LATENCY_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencyHistogram {
    pub count: u64,
    pub sum_seconds: f64,
    /// Cumulative counts, aligned with [`SEND_LATENCY_BUCKETS`].
    pub buckets: Vec<u64>,
}

impl LatencyHistogram {
    fn observe(&mut self, seconds: f64) {
        if self.buckets.len() != SEND_LATENCY_BUCKETS.len() {
            self.buckets = vec![0; SEND_LATENCY_BUCKETS.len()];
        }
        self.count += 1;
        self.sum_seconds += seconds;
        for (bound, bucket) in SEND_LATENCY_BUCKETS.iter().zip(self.buckets.iter_mut()) {
            if seconds <= *bound {
                *bucket += 1;
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdaptorMetrics {
    pub connections: i64,
    pub send_errors: u64,
    pub connect_errors: u64,
    pub send_latency: LatencyHistogram,
}

/// Point-in-time copy of every adaptor's metrics, ordered by adaptor name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub adaptors: BTreeMap<String, AdaptorMetrics>,
}

impl MetricsSnapshot {
    pub fn connections(&self, adaptor: &str) -> i64 {
        self.adaptors.get(adaptor).map_or(0, |m| m.connections)
    }

    pub fn total_connections(&self) -> i64 {
        self.adaptors.values().map(|m| m.connections).sum()
    }
}

#[derive(Debug, Default)]
pub struct LimbMetrics {
    adaptors: DashMap<String, AdaptorMetrics>,
}

impl LimbMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increase_connections(&self, adaptor: &str) {
        self.adaptors.entry(adaptor.to_owned()).or_default().connections += 1;
    }

    pub fn decrease_connections(&self, adaptor: &str) {
        self.adaptors.entry(adaptor.to_owned()).or_default().connections -= 1;
    }

    pub fn increase_send_errors(&self, adaptor: &str) {
        self.adaptors.entry(adaptor.to_owned()).or_default().send_errors += 1;
    }

    pub fn increase_connect_errors(&self, adaptor: &str) {
        self.adaptors.entry(adaptor.to_owned()).or_default().connect_errors += 1;
    }

    pub fn observe_send_latency(&self, adaptor: &str, elapsed: Duration) {
        self.adaptors
            .entry(adaptor.to_owned())
            .or_default()
            .send_latency
            .observe(elapsed.as_secs_f64());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            adaptors: self
                .adaptors
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        }
    }
}
