//! On-the-wire shapes: fixed-width big-endian IDs (§6), a request/response
//! enum pair per §4.6's operation table, and the tagged-union error code the
//! spec calls `Ok(payload) | Err(code, message)`.

use dht_id::{DhtError, Id, IdError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireId {
    pub bits: u32,
    pub bytes: Vec<u8>,
}

impl WireId {
    pub fn from_id(id: Id) -> Self {
        Self {
            bits: id.bits(),
            bytes: id.to_be_bytes(),
        }
    }

    pub fn to_id(&self) -> Result<Id, IdError> {
        Id::from_be_bytes(self.bits, &self.bytes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirePeer {
    pub id: WireId,
    pub address: String,
}

impl WirePeer {
    pub fn from_peer(peer: &dht_routing::PeerRecord) -> Self {
        Self {
            id: WireId::from_id(peer.id),
            address: peer.address.clone(),
        }
    }

    pub fn to_peer(&self) -> Result<dht_routing::PeerRecord, IdError> {
        Ok(dht_routing::PeerRecord::new(self.id.to_id()?, self.address.clone()))
    }
}

/// Mirrors `DhtError`'s taxonomy minus payload-carrying fields that don't
/// need to survive the wire (the operation that failed already identifies
/// the peer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireErrorCode {
    Transport,
    RouteExhausted,
    HopLimitExceeded,
    NotOwner,
    Overloaded,
    InvalidArgument,
    DeadlineExceeded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub code: WireErrorCode,
    pub message: String,
}

impl From<&DhtError> for WireError {
    fn from(e: &DhtError) -> Self {
        let code = match e {
            DhtError::Transport { .. } => WireErrorCode::Transport,
            DhtError::RouteExhausted => WireErrorCode::RouteExhausted,
            DhtError::HopLimitExceeded => WireErrorCode::HopLimitExceeded,
            DhtError::NotOwner { .. } => WireErrorCode::NotOwner,
            DhtError::Overloaded => WireErrorCode::Overloaded,
            DhtError::InvalidArgument(_) => WireErrorCode::InvalidArgument,
            DhtError::DeadlineExceeded => WireErrorCode::DeadlineExceeded,
        };
        Self {
            code,
            message: e.to_string(),
        }
    }
}

impl WireError {
    pub fn into_dht_error(self, peer_address: &str) -> DhtError {
        match self.code {
            WireErrorCode::Transport => DhtError::Transport {
                peer: peer_address.to_string(),
                reason: self.message,
            },
            WireErrorCode::RouteExhausted => DhtError::RouteExhausted,
            WireErrorCode::HopLimitExceeded => DhtError::HopLimitExceeded,
            WireErrorCode::NotOwner => DhtError::NotOwner {
                peer: peer_address.to_string(),
            },
            WireErrorCode::Overloaded => DhtError::Overloaded,
            WireErrorCode::InvalidArgument => DhtError::InvalidArgument(self.message),
            WireErrorCode::DeadlineExceeded => DhtError::DeadlineExceeded,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    Ping,
    GetPredecessor,
    Notify { caller: WirePeer },
    GetSuccessorList,
    FindSuccessor { target: WireId },
    FindSuccessorStep { target: WireId, current_i: WireId, kshift: WireId, hop_count: u32 },
    ClosestPrecedingFinger { target: WireId },
    Put { key: WireId, value: Vec<u8>, ttl_ms: u64 },
    Get { key: WireId },
    Delete { key: WireId },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Ping(WireId),
    GetPredecessor(Option<WirePeer>),
    Notify,
    GetSuccessorList(Vec<WirePeer>),
    FindSuccessor(WirePeer),
    FindSuccessorStep { peer: WirePeer, hop_count: u32 },
    ClosestPrecedingFinger(Option<WirePeer>),
    Put,
    Get(Option<Vec<u8>>),
    Delete,
}

/// One message on the wire: a correlation id for matching responses to
/// requests on a shared connection, a remaining-budget deadline, plus the
/// body. `deadline_ms` is meaningful on requests only (§5: every RPC carries
/// a deadline derived from the caller's deadline minus a small slack);
/// response envelopes carry 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub correlation_id: u64,
    pub deadline_ms: u64,
    pub body: T,
}

pub type RequestEnvelope = Envelope<Request>;
pub type ResponseEnvelope = Envelope<Result<Response, WireError>>;

pub fn duration_from_millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

/// Slack subtracted from an inbound remaining budget before it is handed to
/// a forwardee, so a chain of hops converges on `DeadlineExceeded` instead of
/// each hop re-granting the same budget it received.
pub const DEADLINE_SLACK: Duration = Duration::from_millis(50);

/// The deadline a hop should give its forwardee, derived from the deadline
/// it itself received.
pub fn shrink_deadline(received_ms: u64) -> Duration {
    Duration::from_millis(received_ms).saturating_sub(DEADLINE_SLACK)
}

pub fn deadline_to_millis(deadline: Duration) -> u64 {
    deadline.as_millis().min(u128::from(u64::MAX)) as u64
}
