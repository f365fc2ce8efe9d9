//! Static seed-list and mDNS discovery bootstrap, per §4.8. Both modes
//! converge on the same `join(seed)` procedure; a Node with no seed (empty
//! static list, or discovery that found nothing) starts its own ring.

use crate::config::{BootstrapMode, NodeConfig};
use crate::error::NodeError;
use crate::lifecycle::{LifecycleState, NodeStatus};
use dht_routing::{PeerRecord, PeerTransport, RoutingState};
use mdns_sd::{ServiceDaemon, ServiceEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const MDNS_SERVICE_TYPE: &str = "_dht-cache._tcp.local.";
const MDNS_BROWSE_TIMEOUT: Duration = Duration::from_secs(4);

pub async fn bootstrap(
    config: &NodeConfig,
    state: &Arc<RoutingState>,
    transport: &Arc<dyn PeerTransport>,
    lifecycle: &LifecycleState,
) -> Result<(), NodeError> {
    lifecycle.set(NodeStatus::Joining);

    let seeds = match config.dht.bootstrap_mode {
        BootstrapMode::Static => config.dht.bootstrap_peers.clone(),
        BootstrapMode::Discovery => discover_via_mdns().await,
    };

    let seed = find_live_seed(&seeds, state, transport.as_ref(), config).await;

    match seed {
        Some(seed) => join(state, transport.as_ref(), &seed, config).await?,
        None => {
            info!("no reachable seed, starting a new ring");
            state.set_successor(Some(state.self_peer.clone())).await;
        }
    }

    lifecycle.set(NodeStatus::Ready);
    Ok(())
}

/// Pings each candidate in order and returns the first that answers —
/// mirrors §4.8's "contacts each until one responds to Ping".
async fn find_live_seed(
    addresses: &[String],
    state: &Arc<RoutingState>,
    transport: &dyn PeerTransport,
    config: &NodeConfig,
) -> Option<PeerRecord> {
    for address in addresses {
        if address == &state.self_peer.address {
            continue;
        }
        let probe = PeerRecord::new(state.self_peer.id, address.clone());
        match transport.ping(&probe, config.failure_timeout()).await {
            Ok(remote_id) => return Some(PeerRecord::new(remote_id, address.clone())),
            Err(e) => debug!(address = %address, error = %e, "seed did not respond to ping"),
        }
    }
    None
}

/// `join(seed)`: `successor[0] = seed.find_successor(self.id)`, successor
/// list filled from the new successor's own list, predecessor left nil
/// (stabilization fills it within one cycle).
async fn join(
    state: &Arc<RoutingState>,
    transport: &dyn PeerTransport,
    seed: &PeerRecord,
    config: &NodeConfig,
) -> Result<(), NodeError> {
    let deadline = config.failure_timeout();
    let successor = transport
        .find_successor(seed, state.self_peer.id, deadline)
        .await
        .map_err(|e| NodeError::Bootstrap(format!("seed {} rejected find_successor: {e}", seed.address)))?;

    let mut list = transport
        .get_successor_list(&successor, deadline)
        .await
        .unwrap_or_default();
    list.insert(0, successor);
    state.update_successor_list(list.into_iter().map(Some).collect()).await;
    Ok(())
}

/// Browses `_dht-cache._tcp.local.` for a fixed window and returns every
/// resolved `host:port`, grounded in the teacher's `browse_zhtp_services`
/// collect-then-drop-browser shape.
async fn discover_via_mdns() -> Vec<String> {
    let daemon = match ServiceDaemon::new() {
        Ok(d) => d,
        Err(e) => {
            warn!(error = %e, "failed to start mDNS daemon, falling back to solo ring");
            return Vec::new();
        }
    };

    let browser = match daemon.browse(MDNS_SERVICE_TYPE) {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "failed to browse for peers");
            return Vec::new();
        }
    };

    let mut peers = Vec::new();
    while let Ok(event) = tokio::time::timeout(MDNS_BROWSE_TIMEOUT, browser.recv_async()).await {
        match event {
            Ok(ServiceEvent::ServiceResolved(info)) => {
                peers.push(format!("{}:{}", info.get_hostname().trim_end_matches('.'), info.get_port()));
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
    drop(browser);
    info!(count = peers.len(), "mDNS discovery complete");
    peers
}
