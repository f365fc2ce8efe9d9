use crate::peer::PeerRecord;
use crate::stats::RoutingStatsSnapshot;
use async_trait::async_trait;
use dht_id::{DhtError, Id};
use std::time::Duration;

/// Chord, Koorde, and simple-hash are variants of this one trait: a tagged
/// union of per-protocol state plus a shared table of virtual operations,
/// not a class hierarchy.
#[async_trait]
pub trait RoutingProtocol: Send + Sync {
    /// Returns the peer responsible for `target`. `deadline` bounds every
    /// outbound RPC this call forwards through; an inbound RPC handler
    /// derives it from the caller's own remaining budget minus slack, a
    /// maintenance call passes its protocol's configured deadline.
    async fn find_successor(&self, target: Id, deadline: Duration) -> Result<PeerRecord, DhtError>;

    /// Local-only: the best known candidate strictly between self and target.
    async fn closest_preceding_node(&self, target: Id) -> Option<PeerRecord>;

    /// `stabilize` + `notify` (Chord) or a no-op (Koorde/simple-hash, which
    /// maintain their pointers entirely through `fix_pointers`).
    async fn stabilize(&self) -> Result<(), DhtError>;

    /// `fix_fingers` (Chord, one index per call) or de Bruijn window
    /// maintenance (Koorde). `tick` lets Chord round-robin across calls.
    async fn fix_pointers(&self, tick: u64) -> Result<(), DhtError>;

    async fn check_predecessor(&self) -> Result<(), DhtError>;

    async fn fix_successor_list(&self) -> Result<(), DhtError>;

    /// Inbound handler for the Koorde-only `FindSuccessorStep` RPC. Chord and
    /// simple-hash never receive this call; the default rejects it rather
    /// than silently degrading to a full `find_successor`.
    async fn find_successor_step(
        &self,
        target: Id,
        current_i: Id,
        kshift: Id,
        hop_count: u32,
        deadline: Duration,
    ) -> Result<(PeerRecord, u32), DhtError> {
        let _ = (target, current_i, kshift, hop_count, deadline);
        Err(DhtError::InvalidArgument(
            "find_successor_step is only supported by the koorde protocol".into(),
        ))
    }

    /// True iff this node is currently responsible for `key`.
    async fn owns(&self, key: Id) -> bool;

    /// Inbound handler for a peer's `Notify(caller)` call.
    async fn handle_notify(&self, caller: PeerRecord) -> Result<(), DhtError>;

    fn protocol_name(&self) -> &'static str;

    /// Lookup-path counters for `/metrics`. Simple-hash never populates a
    /// de Bruijn window or a successor fallback path, so its default is a
    /// protocol-tagged all-zero snapshot.
    fn stats(&self) -> RoutingStatsSnapshot {
        RoutingStatsSnapshot {
            protocol: self.protocol_name(),
            ..Default::default()
        }
    }
}

/// Shared predecessor-adoption rule used by every protocol's notify handler:
/// adopt `caller` as predecessor iff none is set, or `caller` is strictly
/// between the current predecessor and self.
pub async fn maybe_adopt_predecessor(state: &crate::state::RoutingState, caller: PeerRecord) {
    let current = state.predecessor().await;
    let should_adopt = match &current {
        None => true,
        Some(pred) => Id::between_open_open(caller.id, pred.id, state.self_peer.id),
    };
    if should_adopt {
        state.update_predecessor(Some(caller)).await;
    }
}
