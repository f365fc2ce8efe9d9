//! Finger-table routing: `find_successor` via closest preceding finger,
//! plus the stabilize / notify / fix_fingers / check_predecessor /
//! fix_successor_list maintenance cycle.

use crate::common;
use crate::peer::PeerRecord;
use crate::protocol::{maybe_adopt_predecessor, RoutingProtocol};
use crate::state::{RoutingSnapshot, RoutingState};
use crate::stats::{RoutingStats, RoutingStatsSnapshot};
use crate::transport::PeerTransport;
use async_trait::async_trait;
use dht_id::{DhtError, Id};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Clone, Copy)]
enum CandidateSource {
    Finger(usize),
    Successor(usize),
}

fn rank(source: CandidateSource) -> usize {
    match source {
        CandidateSource::Finger(i) => i,
        CandidateSource::Successor(i) => usize::MAX / 2 + i,
    }
}

pub struct ChordConfig {
    pub deadline: Duration,
    pub max_retries_per_hop: usize,
}

impl Default for ChordConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(2),
            max_retries_per_hop: 8,
        }
    }
}

pub struct Chord {
    state: Arc<RoutingState>,
    transport: Arc<dyn PeerTransport>,
    config: ChordConfig,
    finger_cursor: AtomicUsize,
    stats: RoutingStats,
}

impl Chord {
    pub fn new(state: Arc<RoutingState>, transport: Arc<dyn PeerTransport>, config: ChordConfig) -> Self {
        Self {
            state,
            transport,
            config,
            finger_cursor: AtomicUsize::new(0),
            stats: RoutingStats::new(),
        }
    }

    /// Finger-table and successor-list entries strictly in `(self, target)`,
    /// largest id first; fingers preferred over successors at equal id, and
    /// among fingers the lower index wins ties.
    fn candidates(&self, snapshot: &RoutingSnapshot, target: Id) -> Vec<(PeerRecord, CandidateSource)> {
        let self_id = self.state.self_peer.id;
        let mut out = Vec::new();
        for (i, slot) in snapshot.fingers.iter().enumerate() {
            if let Some(p) = slot {
                if Id::between_open_open(p.id, self_id, target) {
                    out.push((p.clone(), CandidateSource::Finger(i)));
                }
            }
        }
        for (i, slot) in snapshot.successor_list.iter().enumerate() {
            if let Some(p) = slot {
                if Id::between_open_open(p.id, self_id, target) {
                    out.push((p.clone(), CandidateSource::Successor(i)));
                }
            }
        }
        out.sort_by(|a, b| {
            b.0.id
                .value()
                .cmp(&a.0.id.value())
                .then_with(|| rank(a.1).cmp(&rank(b.1)))
        });
        out
    }

    async fn blank(&self, source: CandidateSource) {
        match source {
            CandidateSource::Finger(i) => self.state.update_finger(i, None).await,
            CandidateSource::Successor(_) => self.state.shift_successor_list_on_failure().await,
        }
    }
}

#[async_trait]
impl RoutingProtocol for Chord {
    async fn find_successor(&self, target: Id, deadline: Duration) -> Result<PeerRecord, DhtError> {
        let snapshot = self.state.snapshot().await;
        let self_id = self.state.self_peer.id;
        if let Some(succ) = snapshot.successor() {
            if Id::between_open_closed(target, self_id, succ.id) {
                return Ok(succ.clone());
            }
        }
        let candidates = self.candidates(&snapshot, target);
        if candidates.is_empty() {
            return snapshot.successor().cloned().ok_or(DhtError::RouteExhausted);
        }
        for (peer, source) in candidates.into_iter().take(self.config.max_retries_per_hop) {
            let started = Instant::now();
            match self.transport.find_successor(&peer, target, deadline).await {
                Ok(result) => {
                    if matches!(source, CandidateSource::Successor(_)) {
                        self.stats.record_successor_fallback(started.elapsed());
                    }
                    return Ok(result);
                }
                Err(e) => {
                    warn!(peer = %peer.address, error = %e, "forwarded find_successor failed");
                    self.blank(source).await;
                }
            }
        }
        Err(DhtError::RouteExhausted)
    }

    async fn closest_preceding_node(&self, target: Id) -> Option<PeerRecord> {
        let snapshot = self.state.snapshot().await;
        self.candidates(&snapshot, target).into_iter().next().map(|(p, _)| p)
    }

    async fn stabilize(&self) -> Result<(), DhtError> {
        common::stabilize_successor(&self.state, self.transport.as_ref(), self.config.deadline).await
    }

    async fn fix_pointers(&self, _tick: u64) -> Result<(), DhtError> {
        let bits = self.state.bits as usize;
        let i = self.finger_cursor.fetch_add(1, Ordering::Relaxed) % bits;
        let target = self.state.self_peer.id.add_mod(1u128 << i);
        match self.find_successor(target, self.config.deadline).await {
            Ok(peer) => self.state.update_finger(i, Some(peer)).await,
            Err(e) => debug!(index = i, error = %e, "fix_fingers leaving slot unchanged"),
        }
        Ok(())
    }

    async fn check_predecessor(&self) -> Result<(), DhtError> {
        common::check_predecessor(&self.state, self.transport.as_ref(), self.config.deadline).await
    }

    async fn fix_successor_list(&self) -> Result<(), DhtError> {
        common::fix_successor_list(&self.state, self.transport.as_ref(), self.config.deadline).await
    }

    async fn owns(&self, key: Id) -> bool {
        self.state.owns(key).await
    }

    async fn handle_notify(&self, caller: PeerRecord) -> Result<(), DhtError> {
        maybe_adopt_predecessor(&self.state, caller).await;
        Ok(())
    }

    fn protocol_name(&self) -> &'static str {
        "chord"
    }

    fn stats(&self) -> RoutingStatsSnapshot {
        self.stats.snapshot(self.protocol_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::new_routing_state;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeTransport {
        find_successor_result: Mutex<Option<Result<PeerRecord, DhtError>>>,
    }

    #[async_trait]
    impl PeerTransport for FakeTransport {
        async fn ping(&self, _peer: &PeerRecord, _deadline: Duration) -> Result<Id, DhtError> {
            Err(DhtError::Transport {
                peer: "fake".into(),
                reason: "unimplemented".into(),
            })
        }
        async fn get_predecessor(
            &self,
            _peer: &PeerRecord,
            _deadline: Duration,
        ) -> Result<Option<PeerRecord>, DhtError> {
            Ok(None)
        }
        async fn notify(
            &self,
            _peer: &PeerRecord,
            _caller: PeerRecord,
            _deadline: Duration,
        ) -> Result<(), DhtError> {
            Ok(())
        }
        async fn get_successor_list(
            &self,
            _peer: &PeerRecord,
            _deadline: Duration,
        ) -> Result<Vec<PeerRecord>, DhtError> {
            Ok(vec![])
        }
        async fn find_successor(
            &self,
            _peer: &PeerRecord,
            _target: Id,
            _deadline: Duration,
        ) -> Result<PeerRecord, DhtError> {
            self.find_successor_result
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(DhtError::RouteExhausted))
        }
        async fn find_successor_step(
            &self,
            _peer: &PeerRecord,
            _target: Id,
            current_i: Id,
            kshift: Id,
            hop_count: u32,
            _deadline: Duration,
        ) -> Result<(PeerRecord, u32), DhtError> {
            let _ = (current_i, kshift);
            Err(DhtError::RouteExhausted).map(|p: PeerRecord| (p, hop_count))
        }
        async fn closest_preceding_finger(
            &self,
            _peer: &PeerRecord,
            _target: Id,
            _deadline: Duration,
        ) -> Result<Option<PeerRecord>, DhtError> {
            Ok(None)
        }
    }

    fn id16(v: u128) -> Id {
        Id::new(16, v).unwrap()
    }

    #[tokio::test]
    async fn find_successor_returns_direct_successor_when_in_range() {
        let self_peer = PeerRecord::new(id16(0x1000), "n1:9000");
        let state = new_routing_state(self_peer.clone(), 16, 4, 16, 0);
        let succ = PeerRecord::new(id16(0x4000), "n2:9000");
        state.set_successor(Some(succ.clone())).await;
        let transport = Arc::new(FakeTransport {
            find_successor_result: Mutex::new(None),
        });
        let chord = Chord::new(state, transport, ChordConfig::default());
        let result = chord.find_successor(id16(0x3000), Duration::from_secs(1)).await.unwrap();
        assert_eq!(result.id, succ.id);
    }

    #[tokio::test]
    async fn find_successor_forwards_when_target_out_of_range() {
        let self_peer = PeerRecord::new(id16(0x1000), "n1:9000");
        let state = new_routing_state(self_peer.clone(), 16, 4, 16, 0);
        let succ = PeerRecord::new(id16(0x2000), "n2:9000");
        state.set_successor(Some(succ.clone())).await;
        let far_finger = PeerRecord::new(id16(0x7000), "n3:9000");
        state.update_finger(10, Some(far_finger.clone())).await;
        let forwarded_answer = PeerRecord::new(id16(0x9000), "n4:9000");
        let transport = Arc::new(FakeTransport {
            find_successor_result: Mutex::new(Some(Ok(forwarded_answer.clone()))),
        });
        let chord = Chord::new(state, transport, ChordConfig::default());
        let result = chord.find_successor(id16(0x8000), Duration::from_secs(1)).await.unwrap();
        assert_eq!(result.id, forwarded_answer.id);
    }

    #[tokio::test]
    async fn handle_notify_adopts_predecessor_when_none_set() {
        let self_peer = PeerRecord::new(id16(0x5000), "n1:9000");
        let state = new_routing_state(self_peer, 16, 4, 16, 0);
        let transport = Arc::new(FakeTransport {
            find_successor_result: Mutex::new(None),
        });
        let chord = Chord::new(state.clone(), transport, ChordConfig::default());
        let caller = PeerRecord::new(id16(0x1000), "n2:9000");
        chord.handle_notify(caller.clone()).await.unwrap();
        assert_eq!(state.predecessor().await.unwrap().id, caller.id);
    }
}
