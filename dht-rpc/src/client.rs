//! `TcpPeerTransport`: the concrete `PeerTransport` a routing protocol calls
//! out through. One short-lived TCP connection per call, the same
//! bind-and-timeout shape as the teacher's `send_zhtp_ping`.

use crate::codec::{read_frame, write_frame};
use crate::wire::{deadline_to_millis, Request, RequestEnvelope, Response, ResponseEnvelope, WireId, WirePeer};
use async_trait::async_trait;
use dht_id::{DhtError, Id};
use dht_routing::{PeerRecord, PeerTransport};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

pub struct TcpPeerTransport {
    next_correlation_id: AtomicU64,
}

impl Default for TcpPeerTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpPeerTransport {
    pub fn new() -> Self {
        Self {
            next_correlation_id: AtomicU64::new(1),
        }
    }

    async fn call(&self, peer: &PeerRecord, request: Request, deadline: Duration) -> Result<Response, DhtError> {
        let correlation_id = self.next_correlation_id.fetch_add(1, Ordering::Relaxed);
        let fut = self.call_inner(peer, correlation_id, request, deadline);
        match timeout(deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(DhtError::DeadlineExceeded),
        }
    }

    async fn call_inner(&self, peer: &PeerRecord, correlation_id: u64, request: Request, deadline: Duration) -> Result<Response, DhtError> {
        let mut stream = TcpStream::connect(&peer.address).await.map_err(|e| DhtError::Transport {
            peer: peer.address.clone(),
            reason: e.to_string(),
        })?;
        let envelope = RequestEnvelope {
            correlation_id,
            deadline_ms: deadline_to_millis(deadline),
            body: request,
        };
        write_frame(&mut stream, &envelope).await.map_err(|e| DhtError::Transport {
            peer: peer.address.clone(),
            reason: e.to_string(),
        })?;
        let response: ResponseEnvelope = read_frame(&mut stream).await.map_err(|e| DhtError::Transport {
            peer: peer.address.clone(),
            reason: e.to_string(),
        })?;
        response.body.map_err(|wire_err| wire_err.into_dht_error(&peer.address))
    }
}

impl TcpPeerTransport {
    /// Storage forwarding for `fix_storage`: not part of `PeerTransport`
    /// since routing never needs to move bytes, only the worker's
    /// ownership-relocation pass does.
    pub async fn put(&self, peer: &PeerRecord, key: Id, value: Vec<u8>, ttl: Duration, deadline: Duration) -> Result<(), DhtError> {
        let ttl_ms = ttl.as_millis().min(u64::MAX as u128) as u64;
        let request = Request::Put { key: WireId::from_id(key), value, ttl_ms };
        match self.call(peer, request, deadline).await? {
            Response::Put => Ok(()),
            _ => unexpected_response(peer),
        }
    }

    pub async fn get(&self, peer: &PeerRecord, key: Id, deadline: Duration) -> Result<Option<Vec<u8>>, DhtError> {
        let request = Request::Get { key: WireId::from_id(key) };
        match self.call(peer, request, deadline).await? {
            Response::Get(bytes) => Ok(bytes),
            _ => unexpected_response(peer),
        }
    }

    pub async fn delete(&self, peer: &PeerRecord, key: Id, deadline: Duration) -> Result<(), DhtError> {
        let request = Request::Delete { key: WireId::from_id(key) };
        match self.call(peer, request, deadline).await? {
            Response::Delete => Ok(()),
            _ => unexpected_response(peer),
        }
    }
}

fn to_peer(wire: WirePeer, source_peer: &PeerRecord) -> Result<PeerRecord, DhtError> {
    wire.to_peer().map_err(|e| DhtError::Transport {
        peer: source_peer.address.clone(),
        reason: e.to_string(),
    })
}

fn to_id(wire: WireId, source_peer: &PeerRecord) -> Result<Id, DhtError> {
    wire.to_id().map_err(|e| DhtError::Transport {
        peer: source_peer.address.clone(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl PeerTransport for TcpPeerTransport {
    async fn ping(&self, peer: &PeerRecord, deadline: Duration) -> Result<Id, DhtError> {
        match self.call(peer, Request::Ping, deadline).await? {
            Response::Ping(id) => to_id(id, peer),
            _ => unexpected_response(peer),
        }
    }

    async fn get_predecessor(&self, peer: &PeerRecord, deadline: Duration) -> Result<Option<PeerRecord>, DhtError> {
        match self.call(peer, Request::GetPredecessor, deadline).await? {
            Response::GetPredecessor(Some(p)) => Ok(Some(to_peer(p, peer)?)),
            Response::GetPredecessor(None) => Ok(None),
            _ => unexpected_response(peer),
        }
    }

    async fn notify(&self, peer: &PeerRecord, caller: PeerRecord, deadline: Duration) -> Result<(), DhtError> {
        let request = Request::Notify { caller: WirePeer::from_peer(&caller) };
        match self.call(peer, request, deadline).await? {
            Response::Notify => Ok(()),
            _ => unexpected_response(peer),
        }
    }

    async fn get_successor_list(&self, peer: &PeerRecord, deadline: Duration) -> Result<Vec<PeerRecord>, DhtError> {
        match self.call(peer, Request::GetSuccessorList, deadline).await? {
            Response::GetSuccessorList(list) => list.into_iter().map(|p| to_peer(p, peer)).collect(),
            _ => unexpected_response(peer),
        }
    }

    async fn find_successor(&self, peer: &PeerRecord, target: Id, deadline: Duration) -> Result<PeerRecord, DhtError> {
        let request = Request::FindSuccessor { target: WireId::from_id(target) };
        match self.call(peer, request, deadline).await? {
            Response::FindSuccessor(p) => to_peer(p, peer),
            _ => unexpected_response(peer),
        }
    }

    async fn find_successor_step(
        &self,
        peer: &PeerRecord,
        target: Id,
        current_i: Id,
        kshift: Id,
        hop_count: u32,
        deadline: Duration,
    ) -> Result<(PeerRecord, u32), DhtError> {
        let request = Request::FindSuccessorStep {
            target: WireId::from_id(target),
            current_i: WireId::from_id(current_i),
            kshift: WireId::from_id(kshift),
            hop_count,
        };
        match self.call(peer, request, deadline).await? {
            Response::FindSuccessorStep { peer: p, hop_count } => Ok((to_peer(p, peer)?, hop_count)),
            _ => unexpected_response(peer),
        }
    }

    async fn closest_preceding_finger(&self, peer: &PeerRecord, target: Id, deadline: Duration) -> Result<Option<PeerRecord>, DhtError> {
        let request = Request::ClosestPrecedingFinger { target: WireId::from_id(target) };
        match self.call(peer, request, deadline).await? {
            Response::ClosestPrecedingFinger(Some(p)) => Ok(Some(to_peer(p, peer)?)),
            Response::ClosestPrecedingFinger(None) => Ok(None),
            _ => unexpected_response(peer),
        }
    }
}

fn unexpected_response<T>(peer: &PeerRecord) -> Result<T, DhtError> {
    Err(DhtError::Transport {
        peer: peer.address.clone(),
        reason: "response variant did not match the request".to_string(),
    })
}
