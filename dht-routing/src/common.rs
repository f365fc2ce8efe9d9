//! Stabilization steps shared by Chord and Koorde: both protocols maintain
//! the same successor/predecessor invariants (SPEC_FULL §4.2), they only
//! differ in how the finger table / de Bruijn window is repaired.

use crate::peer::PeerRecord;
use crate::state::RoutingState;
use crate::transport::PeerTransport;
use dht_id::{DhtError, Id};
use std::time::Duration;
use tracing::{debug, info, warn};

pub async fn stabilize_successor(
    state: &RoutingState,
    transport: &dyn PeerTransport,
    deadline: Duration,
) -> Result<(), DhtError> {
    let self_id = state.self_peer.id;
    let succ = match state.successor().await {
        Some(s) => s,
        None => return Ok(()),
    };
    // `x = successor.predecessor`: when the successor is this node itself
    // (a lone ring of one), that predecessor is a local field, not an RPC
    // call — reading it this way is what lets a second node's join (it
    // notifies this node, which adopts it as predecessor) ever turn into
    // this node adopting that peer as its successor in turn.
    let candidate = if succ.id == self_id {
        state.predecessor().await
    } else {
        match transport.get_predecessor(&succ, deadline).await {
            Ok(x) => x,
            Err(e) => {
                warn!(peer = %succ.address, error = %e, "get_predecessor failed");
                None
            }
        }
    };
    if let Some(x) = candidate {
        if Id::between_open_open(x.id, self_id, succ.id) {
            info!(new_successor = %x.address, "stabilize adopted new successor");
            state.set_successor(Some(x)).await;
        }
    }
    let succ = state.successor().await.unwrap_or(succ);
    if let Err(e) = transport.notify(&succ, state.self_peer.clone(), deadline).await {
        warn!(peer = %succ.address, error = %e, "notify failed during stabilize");
    }
    Ok(())
}

pub async fn check_predecessor(
    state: &RoutingState,
    transport: &dyn PeerTransport,
    deadline: Duration,
) -> Result<(), DhtError> {
    let pred = match state.predecessor().await {
        Some(p) => p,
        None => return Ok(()),
    };
    if transport.ping(&pred, deadline).await.is_err() {
        state.update_predecessor(None).await;
    }
    Ok(())
}

pub async fn fix_successor_list(
    state: &RoutingState,
    transport: &dyn PeerTransport,
    deadline: Duration,
) -> Result<(), DhtError> {
    let succ = match state.successor().await {
        Some(s) => s,
        None => return Ok(()),
    };
    let r = state.successor_list_len;
    match transport.get_successor_list(&succ, deadline).await {
        Ok(mut list) => {
            list.truncate(r.saturating_sub(1));
            let mut new_list: Vec<Option<PeerRecord>> = vec![Some(succ)];
            new_list.extend(list.into_iter().map(Some));
            new_list.truncate(r);
            state.update_successor_list(new_list).await;
        }
        Err(e) => debug!(error = %e, "fix_successor_list failed, leaving list unchanged"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::new_routing_state;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingTransport {
        notified: Mutex<Vec<PeerRecord>>,
    }

    #[async_trait]
    impl PeerTransport for RecordingTransport {
        async fn ping(&self, _peer: &PeerRecord, _deadline: Duration) -> Result<Id, DhtError> {
            unimplemented!()
        }
        async fn get_predecessor(&self, _peer: &PeerRecord, _deadline: Duration) -> Result<Option<PeerRecord>, DhtError> {
            unimplemented!("test only exercises the succ == self branch, which never calls this")
        }
        async fn notify(&self, _peer: &PeerRecord, caller: PeerRecord, _deadline: Duration) -> Result<(), DhtError> {
            self.notified.lock().unwrap().push(caller);
            Ok(())
        }
        async fn get_successor_list(&self, _peer: &PeerRecord, _deadline: Duration) -> Result<Vec<PeerRecord>, DhtError> {
            Ok(vec![])
        }
        async fn find_successor(&self, _peer: &PeerRecord, _target: Id, _deadline: Duration) -> Result<PeerRecord, DhtError> {
            unimplemented!()
        }
        async fn find_successor_step(
            &self,
            _peer: &PeerRecord,
            _target: Id,
            _current_i: Id,
            _kshift: Id,
            _hop_count: u32,
            _deadline: Duration,
        ) -> Result<(PeerRecord, u32), DhtError> {
            unimplemented!()
        }
        async fn closest_preceding_finger(&self, _peer: &PeerRecord, _target: Id, _deadline: Duration) -> Result<Option<PeerRecord>, DhtError> {
            unimplemented!()
        }
    }

    fn id16(v: u128) -> Id {
        Id::new(16, v).unwrap()
    }

    #[tokio::test]
    async fn a_lone_node_adopts_its_own_predecessor_as_successor() {
        let self_peer = PeerRecord::new(id16(0x1000), "n1:9000");
        let state = new_routing_state(self_peer.clone(), 16, 4, 0, 0);
        state.set_successor(Some(self_peer.clone())).await;

        let joiner = PeerRecord::new(id16(0x8000), "n2:9000");
        state.update_predecessor(Some(joiner.clone())).await;

        let transport = RecordingTransport { notified: Mutex::new(Vec::new()) };
        stabilize_successor(&state, &transport, Duration::from_secs(1)).await.unwrap();

        assert_eq!(state.successor().await.unwrap().id, joiner.id);
        assert_eq!(transport.notified.lock().unwrap().as_slice(), &[joiner]);
    }

    #[tokio::test]
    async fn a_lone_node_with_no_predecessor_keeps_its_self_loop() {
        let self_peer = PeerRecord::new(id16(0x1000), "n1:9000");
        let state = new_routing_state(self_peer.clone(), 16, 4, 0, 0);
        state.set_successor(Some(self_peer.clone())).await;

        let transport = RecordingTransport { notified: Mutex::new(Vec::new()) };
        stabilize_successor(&state, &transport, Duration::from_secs(1)).await.unwrap();

        assert_eq!(state.successor().await.unwrap().id, self_peer.id);
        assert_eq!(transport.notified.lock().unwrap().as_slice(), &[self_peer]);
    }
}
