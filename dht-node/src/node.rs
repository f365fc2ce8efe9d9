//! Wires routing, RPC, storage, the HTTP cache surface, bootstrap, and the
//! periodic workers into one running node. Mirrors the teacher's
//! `HttpsGatewayServer::start`: bind every listener up front (so a bind
//! failure surfaces before anything else starts), spawn one task per
//! server, then block on a shutdown signal.

use crate::bootstrap;
use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::http::{self, AppState};
use crate::lifecycle::{LifecycleState, NodeStatus};
use crate::origin::OriginFetcher;
use crate::protocol_handle;
use crate::rpc_handler::NodeRpcHandler;
use crate::worker::{self, Workers};
use dht_cache::{BoundedStore, HotspotTracker, SingleFlight};
use dht_routing::PeerTransport;
use dht_rpc::{RpcServer, TcpPeerTransport};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct Node {
    lifecycle: Arc<LifecycleState>,
    workers: Workers,
    shutdown_tx: watch::Sender<bool>,
    rpc_task: JoinHandle<()>,
    http_task: JoinHandle<()>,
    rpc_addr: SocketAddr,
    http_addr: SocketAddr,
}

impl Node {
    pub async fn build(config: NodeConfig) -> Result<Self, NodeError> {
        let config = Arc::new(config);
        let lifecycle = Arc::new(LifecycleState::new());

        let transport = Arc::new(TcpPeerTransport::new());
        let transport_dyn: Arc<dyn PeerTransport> = transport.clone();
        let ph = protocol_handle::build(&config, transport_dyn.clone())
            .map_err(|e| NodeError::Bootstrap(format!("failed to derive node identity: {e}")))?;

        info!(
            id = %ph.self_peer.id.to_hex(),
            addr = %ph.self_peer.address,
            protocol = ph.protocol.protocol_name(),
            "node identity established"
        );

        let rpc_listener = TcpListener::bind(config.bind_address())
            .await
            .map_err(|e| NodeError::Bind { addr: config.bind_address(), source: e })?;
        let rpc_addr = rpc_listener.local_addr().map_err(|e| NodeError::Bind { addr: config.bind_address(), source: e })?;

        let store = Arc::new(BoundedStore::new(config.cache_capacity_bytes()));
        let rpc_handler = Arc::new(NodeRpcHandler::new(
            ph.state.clone(),
            ph.protocol.clone(),
            store.clone(),
            config.dht.max_concurrent_forwards,
        ));
        let rpc_task = tokio::spawn(async move {
            if let Err(e) = RpcServer::new(rpc_handler).serve(rpc_listener).await {
                error!(error = %e, "rpc server stopped");
            }
        });

        bootstrap::bootstrap(&config, &ph.state, &transport_dyn, &lifecycle).await?;
        info!(status = %lifecycle.get(), "bootstrap complete");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let workers = worker::spawn(
            config.clone(),
            ph.state.clone(),
            ph.protocol.clone(),
            transport.clone(),
            store.clone(),
            lifecycle.clone(),
            shutdown_rx,
        );

        let app_state = AppState {
            config: config.clone(),
            self_peer: ph.self_peer.clone(),
            routing_state: ph.state.clone(),
            protocol: ph.protocol.clone(),
            simple: ph.simple.clone(),
            store,
            single_flight: Arc::new(SingleFlight::new()),
            hotspot: Arc::new(HotspotTracker::new(config.cache.hotspot_decay_rate, config.cache.hotspot_threshold)),
            origin: Arc::new(OriginFetcher::new(config.failure_timeout())),
            lifecycle: lifecycle.clone(),
            http_client: reqwest::Client::new(),
        };

        let http_addr = format!("{}:{}", config.node.bind, config.cache.http_port);
        let http_listener = TcpListener::bind(&http_addr)
            .await
            .map_err(|e| NodeError::Bind { addr: http_addr.clone(), source: e })?;
        let http_addr = http_listener.local_addr().map_err(|e| NodeError::Bind { addr: http_addr.clone(), source: e })?;
        info!(addr = %http_addr, "http cache surface listening");

        let router = http::router(app_state).into_make_service();
        let mut http_shutdown_rx = shutdown_tx.subscribe();
        let http_task = tokio::spawn(async move {
            let server = axum::serve(http_listener, router);
            tokio::select! {
                result = server => {
                    if let Err(e) = result {
                        error!(error = %e, "http server stopped");
                    }
                }
                _ = http_shutdown_rx.changed() => {
                    info!("http server received shutdown signal");
                }
            }
        });

        Ok(Self {
            lifecycle,
            workers,
            shutdown_tx,
            rpc_task,
            http_task,
            rpc_addr,
            http_addr,
        })
    }

    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc_addr
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle.is_ready()
    }

    /// Tears the node down without waiting on `ctrl-c`; used by tests that need a clean stop.
    pub async fn stop(self) {
        self.shutdown().await;
    }

    /// Runs until `ctrl-c`, then tears down cooperatively.
    pub async fn run(self) -> Result<(), NodeError> {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(self) {
        self.lifecycle.set(NodeStatus::Leaving);
        let _ = self.shutdown_tx.send(true);
        self.workers.abort();
        self.rpc_task.abort();
        let _ = self.http_task.await;
        self.lifecycle.set(NodeStatus::Stopped);
    }
}
