use dht_id::Id;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// `(id, address, last_seen)`. Equality is on `id` alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRecord {
    pub id: Id,
    pub address: String,
    pub last_seen_unix_ms: u64,
}

impl PeerRecord {
    pub fn new(id: Id, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
            last_seen_unix_ms: now_unix_ms(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen_unix_ms = now_unix_ms();
    }
}

impl PartialEq for PeerRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for PeerRecord {}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
