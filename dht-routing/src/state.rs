use crate::peer::PeerRecord;
use dht_id::Id;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Everything the stabilizer writes and a lookup reads, under one lock.
///
/// Mirrors the `Arc<RwLock<DhtPeerRegistry>>` shape used for the peer
/// registry: readers clone what they need and release the lock immediately,
/// writers hold it only for the duration of a single atomic update.
#[derive(Clone, Debug)]
pub struct RoutingSnapshot {
    pub successor_list: Vec<Option<PeerRecord>>,
    pub predecessor: Option<PeerRecord>,
    pub fingers: Vec<Option<PeerRecord>>,
    pub debruijn: Vec<Option<PeerRecord>>,
    pub generation: u64,
}

impl RoutingSnapshot {
    pub fn successor(&self) -> Option<&PeerRecord> {
        self.successor_list.first().and_then(|s| s.as_ref())
    }
}

struct Inner {
    successor_list: Vec<Option<PeerRecord>>,
    predecessor: Option<PeerRecord>,
    fingers: Vec<Option<PeerRecord>>,
    debruijn: Vec<Option<PeerRecord>>,
    generation: u64,
}

pub struct RoutingState {
    pub self_peer: PeerRecord,
    pub bits: u32,
    pub successor_list_len: usize,
    inner: RwLock<Inner>,
}

/// Matches the teacher's `new_shared_dht_registry` free-function constructor idiom.
pub fn new_routing_state(
    self_peer: PeerRecord,
    bits: u32,
    successor_list_len: usize,
    finger_count: usize,
    debruijn_count: usize,
) -> Arc<RoutingState> {
    Arc::new(RoutingState {
        self_peer,
        bits,
        successor_list_len,
        inner: RwLock::new(Inner {
            successor_list: vec![None; successor_list_len],
            predecessor: None,
            fingers: vec![None; finger_count],
            debruijn: vec![None; debruijn_count],
            generation: 0,
        }),
    })
}

impl RoutingState {
    /// Immutable view used by a lookup for the duration of one hop.
    pub async fn snapshot(&self) -> RoutingSnapshot {
        let inner = self.inner.read().await;
        RoutingSnapshot {
            successor_list: inner.successor_list.clone(),
            predecessor: inner.predecessor.clone(),
            fingers: inner.fingers.clone(),
            debruijn: inner.debruijn.clone(),
            generation: inner.generation,
        }
    }

    pub async fn update_successor_list(&self, list: Vec<Option<PeerRecord>>) {
        let mut inner = self.inner.write().await;
        let mut list = list;
        list.truncate(self.successor_list_len);
        list.resize(self.successor_list_len, None);
        inner.successor_list = list;
        inner.generation += 1;
    }

    pub async fn set_successor(&self, peer: Option<PeerRecord>) {
        let mut inner = self.inner.write().await;
        if inner.successor_list.is_empty() {
            inner.successor_list.push(peer);
        } else {
            inner.successor_list[0] = peer;
        }
        inner.generation += 1;
    }

    pub async fn update_predecessor(&self, peer: Option<PeerRecord>) {
        let mut inner = self.inner.write().await;
        inner.predecessor = peer;
        inner.generation += 1;
    }

    pub async fn update_finger(&self, i: usize, peer: Option<PeerRecord>) {
        let mut inner = self.inner.write().await;
        if i < inner.fingers.len() {
            inner.fingers[i] = peer;
            inner.generation += 1;
        }
    }

    pub async fn update_debruijn(&self, i: usize, peer: Option<PeerRecord>) {
        let mut inner = self.inner.write().await;
        if i < inner.debruijn.len() {
            inner.debruijn[i] = peer;
            inner.generation += 1;
        }
    }

    /// Slides the successor list left by one and appends `None`.
    pub async fn shift_successor_list_on_failure(&self) {
        let mut inner = self.inner.write().await;
        if !inner.successor_list.is_empty() {
            inner.successor_list.remove(0);
            inner.successor_list.push(None);
        }
        inner.generation += 1;
    }

    pub async fn predecessor(&self) -> Option<PeerRecord> {
        self.inner.read().await.predecessor.clone()
    }

    pub async fn successor(&self) -> Option<PeerRecord> {
        self.inner.read().await.successor_list.first().cloned().flatten()
    }

    /// Ownership predicate: this node owns `key` iff `key ∈ (predecessor, self]`,
    /// treating a nil predecessor as "owns everything" (single-node ring).
    pub async fn owns(&self, key: Id) -> bool {
        match self.predecessor().await {
            None => true,
            Some(pred) => Id::between_open_closed(key, pred.id, self.self_peer.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id16(v: u128) -> Id {
        Id::new(16, v).unwrap()
    }

    fn peer(v: u128) -> PeerRecord {
        PeerRecord::new(id16(v), format!("n{v:x}:9000"))
    }

    #[tokio::test]
    async fn a_failed_successor_is_dropped_and_the_list_shifts_left() {
        let state = new_routing_state(peer(0x1000), 16, 3, 0, 0);
        state
            .update_successor_list(vec![Some(peer(0x2000)), Some(peer(0x3000)), Some(peer(0x4000))])
            .await;

        state.shift_successor_list_on_failure().await;

        let snapshot = state.snapshot().await;
        assert_eq!(snapshot.successor_list[0].as_ref().unwrap().id, id16(0x3000));
        assert_eq!(snapshot.successor_list[1].as_ref().unwrap().id, id16(0x4000));
        assert!(snapshot.successor_list[2].is_none());
        assert_eq!(state.successor().await.unwrap().id, id16(0x3000));
    }

    #[tokio::test]
    async fn ownership_window_is_open_on_the_predecessor_and_closed_on_self() {
        let state = new_routing_state(peer(0x8000), 16, 1, 0, 0);
        state.update_predecessor(Some(peer(0x4000))).await;

        assert!(!state.owns(id16(0x4000)).await, "the predecessor's own id is excluded");
        assert!(state.owns(id16(0x4001)).await);
        assert!(state.owns(id16(0x8000)).await, "self's own id is included");
        assert!(!state.owns(id16(0x8001)).await);
    }

    #[tokio::test]
    async fn a_nil_predecessor_owns_the_whole_ring() {
        let state = new_routing_state(peer(0x8000), 16, 1, 0, 0);
        assert!(state.owns(id16(0x0000)).await);
        assert!(state.owns(id16(0xFFFF)).await);
    }
}
