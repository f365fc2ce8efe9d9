//! Scenario 6: once a url's decayed request rate crosses the configured
//! threshold, `/cache` bypasses ring ownership and starts answering from a
//! randomly chosen live peer (including this node itself) instead of always
//! forwarding to the owner, per the hotspot bypass described in
//! `dht-node/src/http/handlers.rs`'s `cache_handler`.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::Router;
use dht_node::config::{NodeConfig, Protocol};
use dht_node::node::Node;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

fn free_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn spawn_origin() -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_for_handler = hits.clone();
    let app = Router::new()
        .route(
            "/item/:n",
            get(move |State(hits): State<Arc<AtomicUsize>>, Path(n): Path<u32>| {
                hits.fetch_add(1, Ordering::SeqCst);
                async move { ([("content-type", "text/plain")], format!("payload-{n}")) }
            }),
        )
        .with_state(hits_for_handler);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    (addr, hits)
}

// Same shared-`cache.http_port`-over-distinct-loopback-hosts convention as
// the two-node join test; a low threshold/decay here just makes the hotspot
// trip after a handful of requests instead of needing hundreds.
fn chord_config(host: &str, port: u16, cache_port: u16, bootstrap: Vec<String>) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.dht.protocol = Protocol::Chord;
    config.dht.stabilization_interval_ms = 50;
    config.node.bind = host.to_string();
    config.node.host = host.to_string();
    config.node.port = port;
    config.cache.http_port = cache_port;
    config.cache.hotspot_threshold = 3.0;
    config.cache.hotspot_decay_rate = 0.5;
    config.dht.bootstrap_peers = bootstrap;
    config
}

#[tokio::test]
async fn rapid_requests_for_a_remote_key_eventually_bypass_forwarding() {
    let (origin_addr, origin_hits) = spawn_origin().await;

    let host_a = "127.0.0.1";
    let host_b = "127.0.0.2";
    let port_a = free_port();
    let port_b = free_port();
    let cache_port = free_port();

    let node_a = Node::build(chord_config(host_a, port_a, cache_port, Vec::new())).await.unwrap();
    let node_b = Node::build(chord_config(host_b, port_b, cache_port, vec![format!("{host_a}:{port_a}")]))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;

    let client = reqwest::Client::new();

    // Find a key that node A doesn't own: the first request for it is
    // forwarded (MISS-DHT) rather than served locally (MISS-ORIGIN).
    let mut remote_url = None;
    for n in 0..24u32 {
        let url = format!("http://{origin_addr}/item/{n}");
        let response = client
            .get(format!("http://{host_a}:{cache_port}/cache"))
            .query(&[("url", &url)])
            .send()
            .await
            .unwrap();
        let cache_header = response.headers().get("x-cache").unwrap().to_str().unwrap().to_string();
        if cache_header == "MISS-DHT" {
            remote_url = Some(url);
            break;
        }
    }
    let remote_url = remote_url.expect("at least one of 24 keys should not belong to node A");

    // Hammer the same remote key. Each call's instantaneous rate is huge
    // (near-zero elapsed time between calls), so with a threshold of 3.0
    // and a decay of 0.5 the estimate crosses it within a few requests.
    let mut saw_hot = false;
    let mut labels = Vec::new();
    for _ in 0..30 {
        let response = client
            .get(format!("http://{host_a}:{cache_port}/cache"))
            .query(&[("url", &remote_url)])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let label = response.headers().get("x-cache").unwrap().to_str().unwrap().to_string();
        if label == "MISS-HOT" || label == "HIT-LOCAL" {
            saw_hot = true;
        }
        labels.push(label);
        let body = response.text().await.unwrap();
        assert!(body.starts_with("payload-"), "unexpected body for {remote_url}: {body}");
    }

    assert!(
        saw_hot,
        "expected at least one MISS-HOT or HIT-LOCAL response once the url's rate crossed the threshold, got: {labels:?}"
    );
    // The key is served from at most two distinct physical locations (the
    // true owner via normal forwarding, and whichever peer the hotspot path
    // picked), so the origin is never hit more than once per location.
    assert!(
        origin_hits.load(Ordering::SeqCst) <= 2,
        "hotspot bypass must still read through the cache, not refetch from origin on every hot request"
    );

    node_a.stop().await;
    node_b.stop().await;
}
