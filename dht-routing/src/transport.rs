use crate::peer::PeerRecord;
use async_trait::async_trait;
use dht_id::{DhtError, Id};
use std::time::Duration;

/// Outbound RPC calls a routing protocol needs to make against a remote peer.
///
/// Kept as a trait so `dht-routing` never depends on the wire format: the
/// concrete implementation (framed TCP, bincode payloads) lives in
/// `dht-rpc`, which depends on this crate rather than the other way around.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn ping(&self, peer: &PeerRecord, deadline: Duration) -> Result<Id, DhtError>;

    async fn get_predecessor(
        &self,
        peer: &PeerRecord,
        deadline: Duration,
    ) -> Result<Option<PeerRecord>, DhtError>;

    async fn notify(
        &self,
        peer: &PeerRecord,
        caller: PeerRecord,
        deadline: Duration,
    ) -> Result<(), DhtError>;

    async fn get_successor_list(
        &self,
        peer: &PeerRecord,
        deadline: Duration,
    ) -> Result<Vec<PeerRecord>, DhtError>;

    async fn find_successor(
        &self,
        peer: &PeerRecord,
        target: Id,
        deadline: Duration,
    ) -> Result<PeerRecord, DhtError>;

    async fn find_successor_step(
        &self,
        peer: &PeerRecord,
        target: Id,
        current_i: Id,
        kshift: Id,
        hop_count: u32,
        deadline: Duration,
    ) -> Result<(PeerRecord, u32), DhtError>;

    async fn closest_preceding_finger(
        &self,
        peer: &PeerRecord,
        target: Id,
        deadline: Duration,
    ) -> Result<Option<PeerRecord>, DhtError>;
}
