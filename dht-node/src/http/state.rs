//! Shared state handed to every axum handler, mirroring the teacher's
//! `GatewayState` shape: one `Clone`-able struct of `Arc`s, no handler-local
//! globals.

use crate::config::NodeConfig;
use crate::lifecycle::LifecycleState;
use crate::origin::OriginFetcher;
use dht_cache::{BoundedStore, HotspotTracker, SingleFlight};
use dht_routing::{PeerRecord, RoutingProtocol, RoutingState, SimpleHash};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<NodeConfig>,
    pub self_peer: PeerRecord,
    pub routing_state: Arc<RoutingState>,
    pub protocol: Arc<dyn RoutingProtocol>,
    /// Present only under `dht.protocol = simple`; backs `/cluster/add` and
    /// `/cluster/remove`.
    pub simple: Option<Arc<SimpleHash>>,
    pub store: Arc<BoundedStore>,
    pub single_flight: Arc<SingleFlight<crate::origin::OriginError>>,
    pub hotspot: Arc<HotspotTracker>,
    pub origin: Arc<OriginFetcher>,
    pub lifecycle: Arc<LifecycleState>,
    /// Reused for forwarding `/cache` to a peer's own HTTP surface.
    pub http_client: reqwest::Client,
}
