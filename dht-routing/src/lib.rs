//! Routing state shared by all protocol variants, plus the Chord, Koorde,
//! and simple-hash implementations of [`protocol::RoutingProtocol`].

mod common;
pub mod chord;
pub mod koorde;
pub mod peer;
pub mod protocol;
pub mod simple;
pub mod state;
pub mod stats;
pub mod transport;

pub use chord::{Chord, ChordConfig};
pub use dht_id::DhtError;
pub use koorde::{Koorde, KoordeConfig};
pub use peer::PeerRecord;
pub use protocol::RoutingProtocol;
pub use simple::SimpleHash;
pub use state::{new_routing_state, RoutingSnapshot, RoutingState};
pub use stats::{RoutingStats, RoutingStatsSnapshot};
pub use transport::PeerTransport;
