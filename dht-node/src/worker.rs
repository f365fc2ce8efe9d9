//! The four periodic tasks per §4.5, each on its own timer with a
//! `watch::Receiver<bool>` shutdown signal — the same shape as the
//! teacher's `RateLimitState::start_cleanup_task`, one task per concern
//! instead of one cleanup loop.

use crate::config::NodeConfig;
use crate::lifecycle::{LifecycleState, NodeStatus};
use crate::protocol_handle::fix_interval;
use dht_cache::BoundedStore;
use dht_routing::{RoutingProtocol, RoutingState};
use dht_rpc::TcpPeerTransport;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const IN_FLIGHT_RPC_BUDGET: Duration = Duration::from_secs(1);
const FIX_STORAGE_INTERVAL: Duration = Duration::from_secs(20);

pub struct Workers {
    handles: Vec<JoinHandle<()>>,
}

impl Workers {
    /// Aborts every task; used on Node shutdown after the shutdown signal
    /// has had a chance to stop them cooperatively.
    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn spawn(
    config: Arc<NodeConfig>,
    state: Arc<RoutingState>,
    protocol: Arc<dyn RoutingProtocol>,
    transport: Arc<TcpPeerTransport>,
    store: Arc<BoundedStore>,
    lifecycle: Arc<LifecycleState>,
    shutdown_rx: watch::Receiver<bool>,
) -> Workers {
    let mut handles = Vec::with_capacity(4);

    handles.push(spawn_interval(
        "stabilize_successor",
        config.stabilization_interval(),
        shutdown_rx.clone(),
        {
            let protocol = protocol.clone();
            let lifecycle = lifecycle.clone();
            let state = state.clone();
            move || {
                let protocol = protocol.clone();
                let lifecycle = lifecycle.clone();
                let state = state.clone();
                async move {
                    if let Err(e) = protocol.stabilize().await {
                        warn!(error = %e, "stabilize_successor failed");
                    }
                    if lifecycle.get() == NodeStatus::Joining && state.successor().await.is_some() {
                        lifecycle.set(NodeStatus::Ready);
                    }
                }
            }
        },
    ));

    handles.push(spawn_interval(
        "fix_predecessor",
        config.stabilization_interval(),
        shutdown_rx.clone(),
        {
            let protocol = protocol.clone();
            move || {
                let protocol = protocol.clone();
                async move {
                    if let Err(e) = protocol.check_predecessor().await {
                        debug!(error = %e, "fix_predecessor: predecessor unreachable, cleared");
                    }
                }
            }
        },
    ));

    handles.push(spawn_interval(
        "fix_pointers",
        fix_interval(&config),
        shutdown_rx.clone(),
        {
            let protocol = protocol.clone();
            let tick = Arc::new(AtomicU64::new(0));
            move || {
                let protocol = protocol.clone();
                let tick = tick.fetch_add(1, Ordering::Relaxed);
                async move {
                    if let Err(e) = protocol.fix_pointers(tick).await {
                        debug!(error = %e, "fix_pointers left a slot unchanged");
                    }
                }
            }
        },
    ));

    handles.push(spawn_interval(
        "fix_storage",
        FIX_STORAGE_INTERVAL,
        shutdown_rx,
        {
            let protocol = protocol.clone();
            let store = store.clone();
            let transport = transport.clone();
            let default_ttl = Duration::from_secs(config.cache.default_ttl_secs);
            move || {
                let protocol = protocol.clone();
                let store = store.clone();
                let transport = transport.clone();
                async move { relocate_misplaced_keys(protocol.as_ref(), store.as_ref(), transport.as_ref(), default_ttl).await }
            }
        },
    ));

    Workers { handles }
}

fn spawn_interval<F, Fut>(name: &'static str, period: Duration, mut shutdown_rx: watch::Receiver<bool>, mut tick_fn: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    tick_fn().await;
                }
                _ = shutdown_rx.changed() => {
                    debug!(task = name, "worker task received shutdown signal");
                    break;
                }
            }
        }
    })
}

/// Walks every locally stored key; anything this node no longer owns is
/// pushed to its true owner via a direct RPC call, then dropped locally.
async fn relocate_misplaced_keys(
    protocol: &dyn RoutingProtocol,
    store: &BoundedStore,
    transport: &TcpPeerTransport,
    default_ttl: Duration,
) {
    for key in store.keys().await {
        if protocol.owns(key).await {
            continue;
        }
        let owner = match tokio::time::timeout(IN_FLIGHT_RPC_BUDGET, protocol.find_successor(key, IN_FLIGHT_RPC_BUDGET)).await {
            Ok(Ok(peer)) => peer,
            Ok(Err(e)) => {
                debug!(error = %e, "fix_storage: could not resolve true owner, leaving key in place");
                continue;
            }
            Err(_) => continue,
        };
        let Some(value) = store.get(key).await else { continue };
        match transport.put(&owner, key, value.bytes, default_ttl, IN_FLIGHT_RPC_BUDGET).await {
            Ok(()) => {
                store.delete(key).await;
            }
            Err(e) => warn!(peer = %owner.address, error = %e, "fix_storage: relocation failed, retrying next cycle"),
        }
    }
}
