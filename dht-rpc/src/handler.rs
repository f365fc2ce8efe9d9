//! Server-side contract a concrete node implements to answer inbound RPCs.
//! Kept separate from `dht_routing::RoutingProtocol` so the dispatcher can
//! also serve Put/Get/Delete against a storage map without `dht-rpc` taking
//! a dependency on the cache crate.

use async_trait::async_trait;
use dht_id::{DhtError, Id};
use dht_routing::PeerRecord;
use std::time::Duration;

#[async_trait]
pub trait RpcHandler: Send + Sync {
    async fn ping(&self) -> Id;
    async fn get_predecessor(&self) -> Option<PeerRecord>;
    async fn notify(&self, caller: PeerRecord);
    async fn get_successor_list(&self) -> Vec<PeerRecord>;
    async fn find_successor(&self, target: Id, deadline: Duration) -> Result<PeerRecord, DhtError>;
    async fn find_successor_step(
        &self,
        target: Id,
        current_i: Id,
        kshift: Id,
        hop_count: u32,
        deadline: Duration,
    ) -> Result<(PeerRecord, u32), DhtError>;
    async fn closest_preceding_finger(&self, target: Id) -> Option<PeerRecord>;
    async fn put(&self, key: Id, value: Vec<u8>, ttl: Duration) -> Result<(), DhtError>;
    async fn get(&self, key: Id) -> Result<Option<Vec<u8>>, DhtError>;
    async fn delete(&self, key: Id) -> Result<(), DhtError>;
}
