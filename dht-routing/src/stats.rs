//! Lookup-path counters surfaced at `/metrics`: how often a lookup resolved
//! via a de Bruijn hop versus a successor-ring fallback, and how long each
//! kind of hop took. Purely observational; never consulted for routing
//! decisions.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct RoutingStats {
    de_bruijn_success: AtomicU64,
    de_bruijn_success_ms_total: AtomicU64,
    de_bruijn_failures: AtomicU64,
    de_bruijn_failure_ms_total: AtomicU64,
    successor_fallbacks: AtomicU64,
    successor_fallback_ms_total: AtomicU64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RoutingStatsSnapshot {
    pub protocol: &'static str,
    pub de_bruijn_success: u64,
    pub de_bruijn_failures: u64,
    pub successor_fallbacks: u64,
    pub avg_de_bruijn_success_ms: f64,
    pub avg_de_bruijn_failure_ms: f64,
    pub avg_successor_fallback_ms: f64,
}

impl RoutingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_de_bruijn_success(&self, elapsed: Duration) {
        self.de_bruijn_success.fetch_add(1, Ordering::Relaxed);
        self.de_bruijn_success_ms_total.fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_de_bruijn_failure(&self, elapsed: Duration) {
        self.de_bruijn_failures.fetch_add(1, Ordering::Relaxed);
        self.de_bruijn_failure_ms_total.fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_successor_fallback(&self, elapsed: Duration) {
        self.successor_fallbacks.fetch_add(1, Ordering::Relaxed);
        self.successor_fallback_ms_total.fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, protocol: &'static str) -> RoutingStatsSnapshot {
        let success = self.de_bruijn_success.load(Ordering::Relaxed);
        let failures = self.de_bruijn_failures.load(Ordering::Relaxed);
        let fallbacks = self.successor_fallbacks.load(Ordering::Relaxed);
        RoutingStatsSnapshot {
            protocol,
            de_bruijn_success: success,
            de_bruijn_failures: failures,
            successor_fallbacks: fallbacks,
            avg_de_bruijn_success_ms: average(self.de_bruijn_success_ms_total.load(Ordering::Relaxed), success),
            avg_de_bruijn_failure_ms: average(self.de_bruijn_failure_ms_total.load(Ordering::Relaxed), failures),
            avg_successor_fallback_ms: average(self.successor_fallback_ms_total.load(Ordering::Relaxed), fallbacks),
        }
    }
}

fn average(total_ms: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total_ms as f64 / count as f64
    }
}
