//! `/cache`, `/health`, `/metrics`, `/debug`, `/cluster/add`,
//! `/cluster/remove` per §6. Grounded in the teacher's
//! `gateway_handler`/`health_handler` shape: handlers take `State<AppState>`
//! and build a response with `Response::builder()` when raw bytes and
//! custom headers are needed, or a tuple `impl IntoResponse` otherwise.

use super::state::AppState;
use crate::lifecycle::NodeStatus;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use dht_cache::StoredValue;
use dht_id::{DhtError, Id};
use dht_routing::PeerRecord;
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::warn;

fn peer_json(p: &PeerRecord) -> serde_json::Value {
    json!({ "id": p.id.to_hex(), "addr": p.address })
}

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.lifecycle.get();
    let snapshot = state.routing_state.snapshot().await;
    let healthy = status == NodeStatus::Ready;
    let body = json!({
        "healthy": healthy,
        "status": status.to_string(),
        "details": {
            "de_bruijn_count": snapshot.debruijn.iter().filter(|p| p.is_some()).count(),
            "successor_count": snapshot.successor_list.iter().filter(|p| p.is_some()).count(),
            "has_predecessor": snapshot.predecessor.is_some(),
        },
    });
    let code = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(body))
}

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let cache_stats = state.store.stats().await;
    let snapshot = state.routing_state.snapshot().await;
    let routing_stats = state.protocol.stats();
    let hotspots = state.hotspot.hot_urls().await;
    let body = json!({
        "cache": cache_stats,
        "routing": {
            "successor_count": snapshot.successor_list.iter().filter(|p| p.is_some()).count(),
            "debruijn_count": snapshot.debruijn.iter().filter(|p| p.is_some()).count(),
            "has_predecessor": snapshot.predecessor.is_some(),
            "stats": routing_stats,
        },
        "hotspots": {
            "count": hotspots.len(),
            "urls": hotspots.iter().map(|(url, rate)| json!({"url": url, "rate": rate})).collect::<Vec<_>>(),
        },
        "node": { "id": state.self_peer.id.to_hex(), "addr": state.self_peer.address },
    });
    (StatusCode::OK, Json(body))
}

pub async fn debug_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.routing_state.snapshot().await;
    let body = json!({
        "self": peer_json(&state.self_peer),
        "successor": snapshot.successor().map(peer_json),
        "predecessor": snapshot.predecessor.as_ref().map(peer_json),
        "successor_list": snapshot.successor_list.iter().map(|p| p.as_ref().map(peer_json)).collect::<Vec<_>>(),
        "fingers": snapshot.fingers.iter().map(|p| p.as_ref().map(peer_json)).collect::<Vec<_>>(),
        "debruijn_window": snapshot.debruijn.iter().map(|p| p.as_ref().map(peer_json)).collect::<Vec<_>>(),
    });
    (StatusCode::OK, Json(body))
}

#[derive(Debug, Deserialize)]
pub struct ClusterParams {
    node: String,
}

pub async fn cluster_add_handler(State(state): State<AppState>, Query(params): Query<ClusterParams>) -> impl IntoResponse {
    let Some(simple) = &state.simple else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "success": false })));
    };
    match Id::from_string(state.config.dht.id_bits, &params.node) {
        Ok(id) => {
            simple.add_member(PeerRecord::new(id, params.node)).await;
            (StatusCode::OK, Json(json!({ "success": true })))
        }
        Err(e) => {
            warn!(node = %params.node, error = %e, "cluster/add: could not derive member id");
            (StatusCode::BAD_REQUEST, Json(json!({ "success": false })))
        }
    }
}

pub async fn cluster_remove_handler(State(state): State<AppState>, Query(params): Query<ClusterParams>) -> impl IntoResponse {
    let Some(simple) = &state.simple else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "success": false })));
    };
    match Id::from_string(state.config.dht.id_bits, &params.node) {
        Ok(id) => {
            simple.remove_member(id).await;
            (StatusCode::OK, Json(json!({ "success": true })))
        }
        Err(e) => {
            warn!(node = %params.node, error = %e, "cluster/remove: could not derive member id");
            (StatusCode::BAD_REQUEST, Json(json!({ "success": false })))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CacheParams {
    url: String,
}

/// Implements §4.7's five-step lookup: local hit, local miss (origin fetch),
/// remote forward, and the hotspot bypass that overrides ownership once a
/// URL's decayed request rate crosses the configured threshold.
pub async fn cache_handler(State(state): State<AppState>, Query(params): Query<CacheParams>) -> Response {
    let started = Instant::now();
    let url = params.url;

    let key = match Id::from_string(state.config.dht.id_bits, &url) {
        Ok(k) => k,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &state, started, e.to_string()),
    };

    let is_hot = state.hotspot.record_request(&url).await;

    if state.protocol.owns(key).await {
        return serve_local(&state, key, &url, started, "MISS-ORIGIN").await;
    }

    if is_hot {
        if let Some(peer) = random_live_peer(&state).await {
            if peer.id == state.self_peer.id {
                return serve_local(&state, key, &url, started, "MISS-HOT").await;
            }
            return forward_to_peer(&state, &peer, &url, started, "MISS-HOT").await;
        }
    }

    match state.protocol.find_successor(key, state.config.failure_timeout()).await {
        Ok(owner) if owner.id == state.self_peer.id => serve_local(&state, key, &url, started, "MISS-ORIGIN").await,
        Ok(owner) => forward_to_peer(&state, &owner, &url, started, "MISS-DHT").await,
        Err(e) => error_response(route_status(&e), &state, started, e.to_string()),
    }
}

async fn random_live_peer(state: &AppState) -> Option<PeerRecord> {
    let snapshot = state.routing_state.snapshot().await;
    let mut candidates: Vec<PeerRecord> = snapshot.successor_list.into_iter().flatten().collect();
    candidates.push(state.self_peer.clone());
    candidates.choose(&mut rand::thread_rng()).cloned()
}

async fn serve_local(state: &AppState, key: Id, url: &str, started: Instant, miss_label: &'static str) -> Response {
    if let Some(stored) = state.store.get(key).await {
        return bytes_response(StatusCode::OK, state, "HIT-LOCAL", started, stored.bytes, stored.content_type);
    }
    fetch_and_store(state, key, url, started, miss_label).await
}

/// Runs the origin fetch behind the single-flight registry, storing the
/// fetched object before returning so a concurrently-subscribed caller and
/// this caller both read the same bytes back out of `store`.
async fn fetch_and_store(state: &AppState, key: Id, url: &str, started: Instant, miss_label: &'static str) -> Response {
    let origin = state.origin.clone();
    let store = state.store.clone();
    let ttl = Duration::from_secs(state.config.cache.default_ttl_secs);
    let url_owned = url.to_string();

    let result = state
        .single_flight
        .run(url, move || async move {
            let fetched = origin.fetch(&url_owned).await?;
            store.put(key, StoredValue::new(fetched.bytes.clone(), fetched.content_type.clone(), ttl)).await;
            Ok(fetched.bytes)
        })
        .await;

    match result {
        Ok(_) => match state.store.get(key).await {
            Some(stored) => bytes_response(StatusCode::OK, state, miss_label, started, stored.bytes, stored.content_type),
            None => error_response(StatusCode::BAD_GATEWAY, state, started, "fetched object evicted before it could be served".into()),
        },
        Err(e) => error_response(StatusCode::BAD_GATEWAY, state, started, e.to_string()),
    }
}

async fn forward_to_peer(state: &AppState, peer: &PeerRecord, url: &str, started: Instant, label: &'static str) -> Response {
    let host = peer.address.split(':').next().unwrap_or(&peer.address);
    let target = format!("http://{host}:{}/cache", state.config.cache.http_port);
    match state.http_client.get(&target).query(&[("url", url)]).send().await {
        Ok(resp) => {
            let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            let content_type = resp
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            match resp.bytes().await {
                Ok(body) => {
                    let mut builder = Response::builder()
                        .status(status)
                        .header("X-Cache", label)
                        .header("X-Node-ID", state.self_peer.id.to_hex())
                        .header("X-Responsible-Node", peer.address.clone())
                        .header("X-Latency-Ms", started.elapsed().as_millis().to_string());
                    if let Some(ct) = content_type {
                        builder = builder.header(header::CONTENT_TYPE, ct);
                    }
                    builder.body(Body::from(body)).expect("response built from valid header values")
                }
                Err(e) => error_response(StatusCode::BAD_GATEWAY, state, started, e.to_string()),
            }
        }
        Err(e) => error_response(StatusCode::BAD_GATEWAY, state, started, e.to_string()),
    }
}

fn bytes_response(status: StatusCode, state: &AppState, label: &'static str, started: Instant, bytes: Vec<u8>, content_type: Option<String>) -> Response {
    let mut builder = Response::builder()
        .status(status)
        .header("X-Cache", label)
        .header("X-Node-ID", state.self_peer.id.to_hex())
        .header("X-Responsible-Node", state.self_peer.address.clone())
        .header("X-Latency-Ms", started.elapsed().as_millis().to_string());
    if let Some(ct) = content_type {
        builder = builder.header(header::CONTENT_TYPE, ct);
    }
    builder.body(Body::from(bytes)).expect("response built from valid header values")
}

fn error_response(status: StatusCode, state: &AppState, started: Instant, message: String) -> Response {
    Response::builder()
        .status(status)
        .header("X-Node-ID", state.self_peer.id.to_hex())
        .header("X-Latency-Ms", started.elapsed().as_millis().to_string())
        .body(Body::from(message))
        .expect("response built from valid header values")
}

fn route_status(e: &DhtError) -> StatusCode {
    match e {
        DhtError::RouteExhausted | DhtError::HopLimitExceeded => StatusCode::SERVICE_UNAVAILABLE,
        DhtError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        DhtError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        DhtError::NotOwner { .. } | DhtError::Overloaded | DhtError::Transport { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}
