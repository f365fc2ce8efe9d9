//! Imaginary-node traversal over a de Bruijn window: `find_successor`
//! walks the de Bruijn graph one base-k digit of the target per hop,
//! falling back to the successor ring whenever the imaginary node it
//! needs hasn't "arrived" yet.

use crate::common;
use crate::peer::PeerRecord;
use crate::protocol::{maybe_adopt_predecessor, RoutingProtocol};
use crate::state::{RoutingSnapshot, RoutingState};
use crate::stats::{RoutingStats, RoutingStatsSnapshot};
use crate::transport::PeerTransport;
use async_trait::async_trait;
use dht_id::{DhtError, Id, IdError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct KoordeConfig {
    pub k: u64,
    pub log2k: u32,
    pub deadline: Duration,
    pub hop_limit: u32,
}

impl KoordeConfig {
    /// `hop_limit` defaults to `2b + r` per the termination guarantee: at most
    /// `ceil(b / log2k)` de Bruijn hops plus successor-ring fallback hops,
    /// bounded generously so a misbehaving ring fails fast rather than looping.
    pub fn new(bits: u32, successor_list_len: usize, k: u64, deadline: Duration) -> Result<Self, IdError> {
        let log2k = Id::validate_degree(bits, k)?;
        Ok(Self {
            k,
            log2k,
            deadline,
            hop_limit: 2 * bits + successor_list_len as u32,
        })
    }
}

pub struct Koorde {
    state: Arc<RoutingState>,
    transport: Arc<dyn PeerTransport>,
    config: KoordeConfig,
    stats: RoutingStats,
}

/// Which edge of the de Bruijn graph a forwarded hop travelled, for `/metrics`.
#[derive(Clone, Copy)]
enum HopKind {
    DeBruijn,
    SuccessorFallback,
}

/// Outcome of one node's local contribution to a `find_successor_step` chain.
enum StepOutcome {
    Done(PeerRecord),
    /// The imaginary node `current_i` hasn't "arrived" at this node yet;
    /// forward along the successor ring with `current_i`/`kshift` untouched.
    ImaginaryNotArrived { to: PeerRecord, current_i: Id, kshift: Id },
    /// A de Bruijn digit step: `candidates` is the window ordered by
    /// preference (closest preceding `next_i` first), retried in order on
    /// RPC failure; `fallback` is `N.successor`, used unshifted only once
    /// every candidate has failed.
    DeBruijnStep {
        candidates: Vec<PeerRecord>,
        fallback: PeerRecord,
        next_i: Id,
        rest: Id,
        orig_current_i: Id,
        orig_kshift: Id,
    },
}

impl Koorde {
    pub fn new(state: Arc<RoutingState>, transport: Arc<dyn PeerTransport>, config: KoordeConfig) -> Self {
        Self { state, transport, config, stats: RoutingStats::new() }
    }

    /// One node's worth of the algorithm in §4.4: either the search has
    /// already reached its destination, or we pick exactly one next hop
    /// (a de Bruijn window entry, or the successor as an unshifted fallback).
    fn step_local(&self, snapshot: &RoutingSnapshot, target: Id, current_i: Id, kshift: Id) -> Option<StepOutcome> {
        let self_id = self.state.self_peer.id;
        let succ = snapshot.successor()?.clone();
        if Id::between_open_closed(target, self_id, succ.id) {
            return Some(StepOutcome::Done(succ));
        }
        if !Id::between_open_closed(current_i, self_id, succ.id) {
            return Some(StepOutcome::ImaginaryNotArrived { to: succ, current_i, kshift });
        }
        let (digit, rest) = kshift.next_digit_base_k(self.config.log2k);
        let next_i = current_i.mul_k_mod(self.config.k).add_mod(digit as u128);
        // Preference order is the window entry immediately preceding `next_i`
        // first, then progressively further-back entries: `Id::distance(p.id,
        // next_i)` is the clockwise distance *from* the candidate *to*
        // `next_i`, zero for an exact match and smallest for the nearest
        // predecessor, so sorting ascending ranks candidates from closest
        // preceding outward — the order `drive` retries on RPC failure.
        let mut window: Vec<PeerRecord> = snapshot.debruijn.iter().filter_map(|slot| slot.clone()).collect();
        window.sort_by_key(|p| Id::distance(p.id, next_i));
        Some(StepOutcome::DeBruijnStep {
            candidates: window,
            fallback: succ,
            next_i,
            rest,
            orig_current_i: current_i,
            orig_kshift: kshift,
        })
    }

    /// Drives the hop chain starting from a local step, forwarding remaining
    /// hops via RPC. Mirrors the RPC handler a remote node runs for an
    /// inbound `FindSuccessorStep` call.
    async fn drive(
        &self,
        snapshot: &RoutingSnapshot,
        target: Id,
        current_i: Id,
        kshift: Id,
        hop_count: u32,
        deadline: Duration,
    ) -> Result<PeerRecord, DhtError> {
        if hop_count >= self.config.hop_limit {
            return Err(DhtError::HopLimitExceeded);
        }
        match self.step_local(snapshot, target, current_i, kshift) {
            None => Err(DhtError::RouteExhausted),
            Some(StepOutcome::Done(peer)) => Ok(peer),
            Some(StepOutcome::ImaginaryNotArrived { to, current_i, kshift }) => {
                self.forward_one(&to, target, current_i, kshift, hop_count, deadline, HopKind::SuccessorFallback)
                    .await
            }
            Some(StepOutcome::DeBruijnStep {
                candidates,
                fallback,
                next_i,
                rest,
                orig_current_i,
                orig_kshift,
            }) => {
                let mut last_err = None;
                for candidate in &candidates {
                    match self
                        .forward_one(candidate, target, next_i, rest, hop_count, deadline, HopKind::DeBruijn)
                        .await
                    {
                        Ok(peer) => return Ok(peer),
                        Err(e) => last_err = Some(e),
                    }
                }
                // Every de Bruijn window entry failed (or the window was
                // empty): fall back to the successor without shifting, so
                // the next hop re-attempts the same digit.
                match self
                    .forward_one(&fallback, target, orig_current_i, orig_kshift, hop_count, deadline, HopKind::SuccessorFallback)
                    .await
                {
                    Ok(peer) => Ok(peer),
                    Err(e) => Err(last_err.unwrap_or(e)),
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn forward_one(
        &self,
        to: &PeerRecord,
        target: Id,
        current_i: Id,
        kshift: Id,
        hop_count: u32,
        deadline: Duration,
        via: HopKind,
    ) -> Result<PeerRecord, DhtError> {
        let started = Instant::now();
        match self
            .transport
            .find_successor_step(to, target, current_i, kshift, hop_count + 1, deadline)
            .await
        {
            Ok((peer, _updated_hop_count)) => {
                match via {
                    HopKind::DeBruijn => self.stats.record_de_bruijn_success(started.elapsed()),
                    HopKind::SuccessorFallback => self.stats.record_successor_fallback(started.elapsed()),
                }
                Ok(peer)
            }
            Err(e) => {
                if let HopKind::DeBruijn = via {
                    self.stats.record_de_bruijn_failure(started.elapsed());
                }
                warn!(peer = %to.address, error = %e, "find_successor_step forward failed");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl RoutingProtocol for Koorde {
    async fn find_successor(&self, target: Id, deadline: Duration) -> Result<PeerRecord, DhtError> {
        let snapshot = self.state.snapshot().await;
        let self_id = self.state.self_peer.id;
        let succ = snapshot.successor().cloned().ok_or(DhtError::RouteExhausted)?;
        if Id::between_open_closed(target, self_id, succ.id) {
            return Ok(succ);
        }
        let (current_i, kshift) = self_id.best_imaginary(succ.id, target);
        self.drive(&snapshot, target, current_i, kshift, 0, deadline).await
    }

    async fn closest_preceding_node(&self, target: Id) -> Option<PeerRecord> {
        let snapshot = self.state.snapshot().await;
        let self_id = self.state.self_peer.id;
        snapshot
            .debruijn
            .iter()
            .filter_map(|slot| slot.clone())
            .filter(|p| Id::between_open_open(p.id, self_id, target))
            .max_by_key(|p| p.id.value())
    }

    async fn stabilize(&self) -> Result<(), DhtError> {
        common::stabilize_successor(&self.state, self.transport.as_ref(), self.config.deadline).await
    }

    /// De Bruijn window maintenance (§4.4): `estimated_n` is derived from the
    /// gap to the immediate successor, which over-estimates on a sparse
    /// ring (an accepted loss of tightness per the design notes).
    async fn fix_pointers(&self, _tick: u64) -> Result<(), DhtError> {
        let self_id = self.state.self_peer.id;
        let succ = match self.state.successor().await {
            Some(s) => s,
            None => return Ok(()),
        };
        let gap = Id::distance(self_id, succ.id).max(1);
        let ring_size = if self_id.bits() >= 128 {
            u128::MAX as f64
        } else {
            (1u128 << self_id.bits()) as f64
        };
        let estimated_n = ring_size / (gap as f64);
        let anchor_target = self_id.fault_tolerant_target(self.config.k, estimated_n);

        let owner = self.find_successor(anchor_target, self.config.deadline).await?;
        let anchor = match self.transport.get_predecessor(&owner, self.config.deadline).await? {
            Some(a) => a,
            None => owner,
        };

        self.state.update_debruijn(0, Some(anchor.clone())).await;
        match self
            .transport
            .get_successor_list(&anchor, self.config.deadline)
            .await
        {
            Ok(list) => {
                for i in 1..(self.config.k as usize) {
                    self.state.update_debruijn(i, list.get(i - 1).cloned()).await;
                }
            }
            Err(e) => debug!(error = %e, "fix_debruijn: anchor successor list unavailable"),
        }
        Ok(())
    }

    async fn check_predecessor(&self) -> Result<(), DhtError> {
        common::check_predecessor(&self.state, self.transport.as_ref(), self.config.deadline).await
    }

    async fn fix_successor_list(&self) -> Result<(), DhtError> {
        common::fix_successor_list(&self.state, self.transport.as_ref(), self.config.deadline).await
    }

    async fn owns(&self, key: Id) -> bool {
        self.state.owns(key).await
    }

    async fn handle_notify(&self, caller: PeerRecord) -> Result<(), DhtError> {
        maybe_adopt_predecessor(&self.state, caller).await;
        Ok(())
    }

    /// Inbound side of the hop chain driven by a remote caller's `drive`: run
    /// exactly the same local-step-then-forward logic, continuing the chain
    /// at whatever `hop_count` the caller has reached.
    async fn find_successor_step(
        &self,
        target: Id,
        current_i: Id,
        kshift: Id,
        hop_count: u32,
        deadline: Duration,
    ) -> Result<(PeerRecord, u32), DhtError> {
        let snapshot = self.state.snapshot().await;
        let peer = self.drive(&snapshot, target, current_i, kshift, hop_count, deadline).await?;
        Ok((peer, hop_count + 1))
    }

    fn protocol_name(&self) -> &'static str {
        "koorde"
    }

    fn stats(&self) -> RoutingStatsSnapshot {
        self.stats.snapshot(self.protocol_name())
    }
}
