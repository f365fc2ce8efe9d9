//! Scenario 5: when the cluster gains a member, a consistent-hashing ring
//! (Chord) remaps only the keys that fall in the new node's ownership
//! window, while the non-consistent `simple-hash` baseline remaps most of
//! the keyspace because `hash(key) % member_count` shifts almost every
//! index when `member_count` changes.

use dht_id::Id;
use dht_routing::{new_routing_state, PeerRecord, RoutingProtocol, SimpleHash};
use std::time::Duration;

const BITS: u32 = 16;
const RING_SIZE: u128 = 1 << BITS;
const NODE_COUNT: usize = 8;
const SAMPLE_KEYS: usize = 500;

fn id(v: u128) -> Id {
    Id::new(BITS, v % RING_SIZE).unwrap()
}

fn peer(v: u128) -> PeerRecord {
    PeerRecord::new(id(v), format!("n{v:x}:9000"))
}

/// Evenly spaced ids around the ring, not randomly scattered, so that
/// inserting one more node has a predictable, small ownership window.
fn spaced_ids(count: usize) -> Vec<u128> {
    let step = RING_SIZE / count as u128;
    (0..count).map(|i| i as u128 * step + step / 2).collect()
}

async fn chord_owner(predecessors_and_self: &[(Id, Id)], key: Id) -> Option<Id> {
    for (pred, this) in predecessors_and_self {
        let state = new_routing_state(PeerRecord::new(*this, "n:9000"), BITS, 1, 0, 0);
        state.update_predecessor(Some(PeerRecord::new(*pred, "p:9000"))).await;
        if state.owns(key).await {
            return Some(*this);
        }
    }
    None
}

/// Builds `(predecessor_id, self_id)` pairs for a sorted ring of node ids.
fn ring_windows(mut ids: Vec<u128>) -> Vec<(Id, Id)> {
    ids.sort_unstable();
    let n = ids.len();
    (0..n)
        .map(|i| {
            let pred = ids[(i + n - 1) % n];
            let this = ids[i];
            (id(pred), id(this))
        })
        .collect()
}

#[tokio::test]
async fn consistent_hashing_remaps_far_fewer_keys_than_simple_hash_on_join() {
    let base_ids = spaced_ids(NODE_COUNT);
    let keys: Vec<Id> = (0..SAMPLE_KEYS).map(|i| id((i as u128) * 97 + 13)).collect();

    // --- Chord: ownership windows before and after one more node joins ---
    let before_windows = ring_windows(base_ids.clone());
    let mut before_owners = Vec::with_capacity(keys.len());
    for k in &keys {
        before_owners.push(chord_owner(&before_windows, *k).await);
    }

    let joined_id = base_ids[0] + (RING_SIZE / NODE_COUNT as u128) / 2;
    let mut after_ids = base_ids.clone();
    after_ids.push(joined_id);
    let after_windows = ring_windows(after_ids);
    let mut after_owners = Vec::with_capacity(keys.len());
    for k in &keys {
        after_owners.push(chord_owner(&after_windows, *k).await);
    }

    let chord_remapped = before_owners
        .iter()
        .zip(after_owners.iter())
        .filter(|(b, a)| b != a)
        .count();
    let chord_churn = chord_remapped as f64 / keys.len() as f64;

    // --- simple-hash: same membership change, owner by modulo index ---
    let simple = SimpleHash::new(peer(base_ids[0]));
    for &v in &base_ids[1..] {
        simple.add_member(peer(v)).await;
    }
    let mut simple_before = Vec::with_capacity(keys.len());
    for k in &keys {
        simple_before.push(simple.find_successor(*k, Duration::from_secs(1)).await.unwrap().id);
    }
    simple.add_member(peer(joined_id)).await;
    let mut simple_after = Vec::with_capacity(keys.len());
    for k in &keys {
        simple_after.push(simple.find_successor(*k, Duration::from_secs(1)).await.unwrap().id);
    }
    let simple_remapped = simple_before
        .iter()
        .zip(simple_after.iter())
        .filter(|(b, a)| b != a)
        .count();
    let simple_churn = simple_remapped as f64 / keys.len() as f64;

    assert!(
        chord_churn < 0.3,
        "a single join should only disturb the new node's local window, got churn={chord_churn}"
    );
    assert!(
        simple_churn > 0.5,
        "modulo reassignment should disturb most of the keyspace on a membership change, got churn={simple_churn}"
    );
    assert!(
        chord_churn < simple_churn,
        "consistent hashing must remap strictly fewer keys than the non-consistent baseline (chord={chord_churn}, simple={simple_churn})"
    );
}
