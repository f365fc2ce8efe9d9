//! Exponentially-decayed per-URL request-rate estimator (§4.7): once a
//! URL's estimated rate crosses the configured threshold it is "hot" and
//! ownership is bypassed for serving and replication.

use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::Mutex;

struct Entry {
    url: String,
    rate: f64,
    last_request: Instant,
}

/// Internal map key: a blake3 digest of the URL rather than the URL itself,
/// so the hot-path lock never holds a growing set of arbitrary-length strings.
type UrlHash = [u8; 32];

fn hash_url(url: &str) -> UrlHash {
    *blake3::hash(url.as_bytes()).as_bytes()
}

pub struct HotspotTracker {
    entries: Mutex<HashMap<UrlHash, Entry>>,
    decay_rate: f64,
    threshold: f64,
}

impl HotspotTracker {
    /// `decay_rate` is `γ` in `rate ← γ·rate + (1−γ)·instantaneous_rate`.
    pub fn new(decay_rate: f64, threshold: f64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            decay_rate,
            threshold,
        }
    }

    /// Records one request and returns whether the URL is hot afterward.
    pub async fn record_request(&self, url: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(hash_url(url)).or_insert(Entry {
            url: url.to_string(),
            rate: 0.0,
            last_request: now,
        });
        let dt = now.saturating_duration_since(entry.last_request).as_secs_f64().max(1e-3);
        let instantaneous_rate = 1.0 / dt;
        entry.rate = self.decay_rate * entry.rate + (1.0 - self.decay_rate) * instantaneous_rate;
        entry.last_request = now;
        entry.rate > self.threshold
    }

    pub async fn is_hot(&self, url: &str) -> bool {
        self.entries
            .lock()
            .await
            .get(&hash_url(url))
            .map(|e| e.rate > self.threshold)
            .unwrap_or(false)
    }

    pub async fn hot_urls(&self) -> Vec<(String, f64)> {
        self.entries
            .lock()
            .await
            .values()
            .filter(|e| e.rate > self.threshold)
            .map(|e| (e.url.clone(), e.rate))
            .collect()
    }
}
