//! Scenario 2: a second Chord node joins a lone node's ring. After
//! stabilization converges each is the other's successor and predecessor,
//! and a request entering either node is served locally when that node
//! owns the key (MISS-ORIGIN) or forwarded to the owner (MISS-DHT).

use axum::extract::{Path, State};
use axum::routing::get;
use axum::Router;
use dht_node::config::{NodeConfig, Protocol};
use dht_node::node::Node;
use std::collections::HashSet;
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

// `/cache` forwarding assumes every ring member listens for HTTP on the
// same `cache.http_port` (DESIGN.md's documented convention) and derives
// the peer's host from its RPC address. Loopback covers 127.0.0.0/8, so
// each node gets its own address on that range instead of its own port,
// letting both nodes share one `cache.http_port` like a real cluster would.
fn chord_config(host: &str, port: u16, cache_port: u16, stabilize_ms: u64, bootstrap: Vec<String>) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.dht.protocol = Protocol::Chord;
    config.dht.stabilization_interval_ms = stabilize_ms;
    config.node.bind = host.to_string();
    config.node.host = host.to_string();
    config.node.port = port;
    config.cache.http_port = cache_port;
    config.dht.bootstrap_peers = bootstrap;
    config
}

#[tokio::test]
async fn two_nodes_converge_and_split_ownership() {
    let (origin_addr, origin_hits) = spawn_origin().await;

    let host_a = "127.0.0.1";
    let host_b = "127.0.0.2";
    let port_a = free_port();
    let port_b = free_port();
    let cache_port = free_port();

    let node_a = Node::build(chord_config(host_a, port_a, cache_port, 50, Vec::new())).await.unwrap();
    assert!(node_a.is_ready());

    let node_b = Node::build(chord_config(host_b, port_b, cache_port, 50, vec![format!("{host_a}:{port_a}")]))
        .await
        .unwrap();
    assert!(node_b.is_ready(), "join() sets a successor before Node::build returns");

    // Let a few stabilization rounds run so predecessor/successor pointers
    // converge in both directions.
    tokio::time::sleep(Duration::from_millis(600)).await;

    let client = reqwest::Client::new();
    let debug_a: serde_json::Value = client
        .get(format!("http://{host_a}:{cache_port}/debug"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let debug_b: serde_json::Value = client
        .get(format!("http://{host_b}:{cache_port}/debug"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(debug_a["successor"]["addr"], format!("{host_b}:{port_b}"));
    assert_eq!(debug_b["successor"]["addr"], format!("{host_a}:{port_a}"));
    assert_eq!(debug_a["predecessor"]["addr"], format!("{host_b}:{port_b}"));
    assert_eq!(debug_b["predecessor"]["addr"], format!("{host_a}:{port_a}"));

    let mut seen_local = false;
    let mut seen_forwarded = false;
    let mut responsible_nodes = HashSet::new();

    for n in 0..24u32 {
        let url = format!("http://{origin_addr}/item/{n}");
        let response = client
            .get(format!("http://{host_a}:{cache_port}/cache"))
            .query(&[("url", &url)])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let cache_header = response.headers().get("x-cache").unwrap().to_str().unwrap().to_string();
        let responsible = response.headers().get("x-responsible-node").unwrap().to_str().unwrap().to_string();
        responsible_nodes.insert(responsible);
        match cache_header.as_str() {
            "MISS-ORIGIN" => seen_local = true,
            "MISS-DHT" => seen_forwarded = true,
            other => panic!("unexpected X-Cache value on first fetch: {other}"),
        }
        let body = response.text().await.unwrap();
        assert_eq!(body, format!("payload-{n}"));
    }

    assert!(seen_local, "at least one of 24 random keys should land on node A itself");
    assert!(seen_forwarded, "at least one of 24 random keys should land on node B and be forwarded");
    assert_eq!(
        responsible_nodes,
        HashSet::from([format!("{host_a}:{port_a}"), format!("{host_b}:{port_b}")]),
        "both ring members should have ended up responsible for at least one key"
    );
    assert_eq!(origin_hits.load(Ordering::SeqCst), 24, "each distinct url is fetched from the origin exactly once");

    // Re-requesting the same key should never cause a second origin fetch,
    // whether node A now serves it locally or forwards it again.
    let repeat_url = format!("http://{origin_addr}/item/0");
    let repeat = client
        .get(format!("http://{host_a}:{cache_port}/cache"))
        .query(&[("url", &repeat_url)])
        .send()
        .await
        .unwrap();
    let repeat_header = repeat.headers().get("x-cache").unwrap().to_str().unwrap().to_string();
    assert!(
        repeat_header == "HIT-LOCAL" || repeat_header == "MISS-DHT",
        "repeat request is either served from A's own cache or forwarded again to the same owner, never refetched from origin by a third node"
    );
    assert_eq!(origin_hits.load(Ordering::SeqCst), 24, "no extra origin fetch for a url already cached somewhere in the ring");

    node_a.stop().await;
    node_b.stop().await;
}
