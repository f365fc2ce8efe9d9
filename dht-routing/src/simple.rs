//! Non-consistent baseline: ownership is `members[hash(key) % len(members)]`
//! over an explicitly maintained membership list. Included only to measure
//! the remap cost that consistent hashing (Chord/Koorde) avoids; every
//! membership change can reassign almost every key.

use crate::peer::PeerRecord;
use crate::protocol::RoutingProtocol;
use async_trait::async_trait;
use dht_id::{DhtError, Id};
use std::time::Duration;
use tokio::sync::RwLock;

pub struct SimpleHash {
    self_peer: PeerRecord,
    members: RwLock<Vec<PeerRecord>>,
}

impl SimpleHash {
    pub fn new(self_peer: PeerRecord) -> Self {
        let seed = self_peer.clone();
        Self {
            self_peer,
            members: RwLock::new(vec![seed]),
        }
    }

    /// Membership changes propagate only through explicit `/cluster/add` and
    /// `/cluster/remove` calls; there is no discovery or consistency promise
    /// between a change and concurrent lookups.
    pub async fn add_member(&self, peer: PeerRecord) {
        let mut members = self.members.write().await;
        if !members.iter().any(|p| p.id == peer.id) {
            members.push(peer);
            members.sort_by_key(|p| p.id.value());
        }
    }

    pub async fn remove_member(&self, id: Id) {
        let mut members = self.members.write().await;
        members.retain(|p| p.id != id);
    }

    pub async fn members(&self) -> Vec<PeerRecord> {
        self.members.read().await.clone()
    }

    async fn owner(&self, key: Id) -> Option<PeerRecord> {
        let members = self.members.read().await;
        if members.is_empty() {
            return None;
        }
        let index = (key.value() % members.len() as u128) as usize;
        members.get(index).cloned()
    }
}

#[async_trait]
impl RoutingProtocol for SimpleHash {
    async fn find_successor(&self, target: Id, _deadline: Duration) -> Result<PeerRecord, DhtError> {
        self.owner(target).await.ok_or(DhtError::RouteExhausted)
    }

    async fn closest_preceding_node(&self, _target: Id) -> Option<PeerRecord> {
        None
    }

    async fn stabilize(&self) -> Result<(), DhtError> {
        Ok(())
    }

    async fn fix_pointers(&self, _tick: u64) -> Result<(), DhtError> {
        Ok(())
    }

    async fn check_predecessor(&self) -> Result<(), DhtError> {
        Ok(())
    }

    async fn fix_successor_list(&self) -> Result<(), DhtError> {
        Ok(())
    }

    async fn owns(&self, key: Id) -> bool {
        matches!(self.owner(key).await, Some(p) if p.id == self.self_peer.id)
    }

    async fn handle_notify(&self, _caller: PeerRecord) -> Result<(), DhtError> {
        Ok(())
    }

    fn protocol_name(&self) -> &'static str {
        "simple"
    }
}
