//! Translates the wire-level `RpcHandler` contract into calls against the
//! routing state, the selected protocol, and the cache's storage map.

use async_trait::async_trait;
use dht_cache::{BoundedStore, StoredValue};
use dht_id::{DhtError, Id};
use dht_routing::{PeerRecord, RoutingProtocol, RoutingState};
use dht_rpc::RpcHandler;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub struct NodeRpcHandler {
    state: Arc<RoutingState>,
    protocol: Arc<dyn RoutingProtocol>,
    store: Arc<BoundedStore>,
    /// Bounds concurrent outbound forwards this node issues while answering
    /// an inbound `find_successor`/`find_successor_step` call. A permit is
    /// never awaited: when none is free the hop fails fast with `Overloaded`
    /// rather than queuing behind an already-saturated forwarding path.
    forward_limit: Semaphore,
}

impl NodeRpcHandler {
    pub fn new(
        state: Arc<RoutingState>,
        protocol: Arc<dyn RoutingProtocol>,
        store: Arc<BoundedStore>,
        max_concurrent_forwards: usize,
    ) -> Self {
        Self {
            state,
            protocol,
            store,
            forward_limit: Semaphore::new(max_concurrent_forwards),
        }
    }
}

#[async_trait]
impl RpcHandler for NodeRpcHandler {
    async fn ping(&self) -> Id {
        self.state.self_peer.id
    }

    async fn get_predecessor(&self) -> Option<PeerRecord> {
        self.state.predecessor().await
    }

    async fn notify(&self, caller: PeerRecord) {
        if let Err(e) = self.protocol.handle_notify(caller).await {
            tracing::debug!(error = %e, "notify handler declined caller");
        }
    }

    async fn get_successor_list(&self) -> Vec<PeerRecord> {
        self.state.snapshot().await.successor_list.into_iter().flatten().collect()
    }

    async fn find_successor(&self, target: Id, deadline: Duration) -> Result<PeerRecord, DhtError> {
        let _permit = self.forward_limit.try_acquire().map_err(|_| DhtError::Overloaded)?;
        self.protocol.find_successor(target, deadline).await
    }

    async fn find_successor_step(
        &self,
        target: Id,
        current_i: Id,
        kshift: Id,
        hop_count: u32,
        deadline: Duration,
    ) -> Result<(PeerRecord, u32), DhtError> {
        let _permit = self.forward_limit.try_acquire().map_err(|_| DhtError::Overloaded)?;
        self.protocol.find_successor_step(target, current_i, kshift, hop_count, deadline).await
    }

    async fn closest_preceding_finger(&self, target: Id) -> Option<PeerRecord> {
        self.protocol.closest_preceding_node(target).await
    }

    async fn put(&self, key: Id, value: Vec<u8>, ttl: Duration) -> Result<(), DhtError> {
        self.require_ownership(key).await?;
        self.store.put(key, StoredValue::new(value, None, ttl)).await;
        Ok(())
    }

    async fn get(&self, key: Id) -> Result<Option<Vec<u8>>, DhtError> {
        self.require_ownership(key).await?;
        Ok(self.store.get(key).await.map(|v| v.bytes))
    }

    async fn delete(&self, key: Id) -> Result<(), DhtError> {
        self.require_ownership(key).await?;
        self.store.delete(key).await;
        Ok(())
    }
}

impl NodeRpcHandler {
    async fn require_ownership(&self, key: Id) -> Result<(), DhtError> {
        if self.protocol.owns(key).await {
            Ok(())
        } else {
            Err(DhtError::NotOwner {
                peer: self.state.self_peer.address.clone(),
            })
        }
    }
}
