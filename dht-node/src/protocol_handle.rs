//! Builds the `RoutingProtocol` variant named by configuration and the
//! `RoutingState` it shares with the RPC handler and the worker tasks.

use crate::config::{NodeConfig, Protocol};
use dht_id::Id;
use dht_routing::{
    new_routing_state, Chord, ChordConfig, Koorde, KoordeConfig, PeerRecord, PeerTransport, RoutingProtocol, RoutingState,
    SimpleHash,
};
use std::sync::Arc;
use std::time::Duration;

pub struct ProtocolHandle {
    pub self_peer: PeerRecord,
    pub state: Arc<RoutingState>,
    pub protocol: Arc<dyn RoutingProtocol>,
    /// Set only when `dht.protocol = simple`: `/cluster/add` and
    /// `/cluster/remove` need the concrete type, not the trait object,
    /// since membership editing isn't part of `RoutingProtocol`.
    pub simple: Option<Arc<SimpleHash>>,
}

/// `self.id` is the SHA-1 derivation of `node.id_override` when set,
/// otherwise of the node's own address, matching §4.1's `from_string`.
pub fn self_id(config: &NodeConfig) -> Result<Id, dht_id::IdError> {
    let bits = config.dht.id_bits;
    match &config.node.id_override {
        Some(hex) => Id::from_hex(bits, hex),
        None => Id::from_string(bits, &config.node_address()),
    }
}

pub fn build(config: &NodeConfig, transport: Arc<dyn PeerTransport>) -> Result<ProtocolHandle, dht_id::IdError> {
    let id = self_id(config)?;
    let self_peer = PeerRecord::new(id, config.node_address());
    let bits = config.dht.id_bits;
    let r = config.dht.successor_list_size;

    let (finger_count, debruijn_count) = match config.dht.protocol {
        Protocol::Chord => (bits as usize, 0),
        Protocol::Koorde => (0, config.dht.debruijn_degree as usize),
        Protocol::Simple => (0, 0),
    };
    let state = new_routing_state(self_peer.clone(), bits, r, finger_count, debruijn_count);

    let mut simple = None;
    let protocol: Arc<dyn RoutingProtocol> = match config.dht.protocol {
        Protocol::Chord => {
            let cfg = ChordConfig {
                deadline: config.failure_timeout(),
                ..ChordConfig::default()
            };
            Arc::new(Chord::new(state.clone(), transport, cfg))
        }
        Protocol::Koorde => {
            let cfg = KoordeConfig::new(bits, r, config.dht.debruijn_degree, config.failure_timeout())?;
            Arc::new(Koorde::new(state.clone(), transport, cfg))
        }
        Protocol::Simple => {
            let hash = Arc::new(SimpleHash::new(self_peer.clone()));
            simple = Some(hash.clone());
            hash
        }
    };

    Ok(ProtocolHandle { self_peer, state, protocol, simple })
}

pub fn fix_interval(config: &NodeConfig) -> Duration {
    match config.dht.protocol {
        Protocol::Koorde => Duration::from_millis(config.dht.debruijn_fix_interval_ms),
        _ => Duration::from_millis(100),
    }
}
