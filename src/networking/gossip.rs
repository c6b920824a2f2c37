// Copyright (c) 2026 Nullmesh
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Nullifier gossip engine.
//!
//! Epidemic broadcast with layered admission checks: timestamp window,
//! duplicate detection, witness verification, optional ownership-proof
//! binding, peer scoring with auto-disconnect, and a bounded record store
//! with background pruning.
//!
//! Inbound frames arrive on a bounded channel drained by a worker task; the
//! pruner is a second owned task. `destroy` cancels both. Admission holds
//! the engine lock across its critical section, witness verification
//! included, so the duplicate-check/insert pair can never race a concurrent
//! admission of the same nullifier. Broadcast fan-out runs outside the lock
//! and in parallel across peers.

use crate::clients::{Issuer, Witness};
use crate::monitoring::metrics::Metrics;
use crate::networking::peer::Peer;
use crate::networking::reputation::{Decision, Offense, PeerLedger};
use crate::networking::store::NullifierStore;
use crate::networking::wire::{self, GossipMessage, WireError};
use crate::core::types::{now_ms, Attestation, Nullifier, NullifierRecord};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex as StdMutex, Weak,
};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Gossip engine errors (construction and publish only; admission rejects
/// are penalties, not errors).
#[derive(Debug, Error)]
pub enum GossipError {
    /// This node already published or observed the nullifier.
    #[error("double spend (local): {0}")]
    DoubleSpendLocal(Nullifier),
    /// `destroy` was called; no new work is accepted.
    #[error("engine destroyed")]
    Destroyed,
    /// Ownership proofs required but no issuer client configured.
    #[error("ownership proofs required but no issuer client configured")]
    MissingIssuer,
    /// Wire codec failure.
    #[error("wire: {0}")]
    Wire(#[from] WireError),
}

/// Runtime configuration for the gossip engine.
#[derive(Clone, Debug)]
pub struct GossipConfig {
    /// Hard cap on stored records (oldest evicted beyond this).
    pub max_nullifiers: usize,
    /// Background prune cadence.
    pub prune_interval: Duration,
    /// Record lifetime relative to first local observation; also the
    /// admission window for proof timestamps.
    pub max_nullifier_age: Duration,
    /// Score below which a peer is disconnected.
    pub peer_score_threshold: i32,
    /// Tolerated forward clock skew on proof timestamps.
    pub max_timestamp_future: Duration,
    /// Require issuer-bound ownership proofs on every message.
    pub require_ownership_proof: bool,
    /// Bound on the inbound frame channel.
    pub inbound_capacity: usize,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            max_nullifiers: 100_000,
            prune_interval: Duration::from_secs(3600),
            // ~576 days; long enough that replaying a pruned nullifier is
            // economically pointless.
            max_nullifier_age: Duration::from_secs(576 * 86_400),
            peer_score_threshold: -50,
            max_timestamp_future: Duration::from_secs(5),
            require_ownership_proof: false,
            inbound_capacity: 1024,
        }
    }
}

/// Outcome of one admission run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Passed every check; stored and rebroadcast.
    Accepted,
    /// Already known; peer count after the bump.
    Duplicate(u32),
    /// Failed a check; sender penalized.
    Rejected(Offense),
    /// Dropped without processing (unknown sender or destroyed engine).
    Ignored,
}

/// One frame handed in by a transport adapter.
#[derive(Debug)]
pub struct InboundFrame {
    /// Sending peer id, when the transport knows it.
    pub from: Option<String>,
    /// Encoded wire frame.
    pub frame: Vec<u8>,
}

/// Engine counters snapshot.
#[derive(Clone, Copy, Debug)]
pub struct GossipStats {
    /// Records currently stored.
    pub known_nullifiers: usize,
    /// Peers currently registered.
    pub connected_peers: usize,
    /// Peers with score records.
    pub tracked_scores: usize,
}

type ReceiveHandler = Box<dyn Fn(&Nullifier, &Attestation) + Send + Sync>;

struct EngineInner {
    store: NullifierStore,
    ledger: PeerLedger,
    peers: BTreeMap<String, Arc<dyn Peer>>,
}

impl EngineInner {
    fn connected_peers(&self) -> Vec<Arc<dyn Peer>> {
        self.peers
            .values()
            .filter(|p| p.is_connected())
            .cloned()
            .collect()
    }
}

/// The gossip engine. Owns the record store and the score ledger; shared
/// through `Arc` with its worker tasks holding weak references.
pub struct GossipEngine {
    cfg: GossipConfig,
    witness: Arc<dyn Witness>,
    issuer: Option<Arc<dyn Issuer>>,
    metrics: Arc<Metrics>,
    inner: Mutex<EngineInner>,
    inbound_tx: mpsc::Sender<InboundFrame>,
    handler: StdMutex<Option<ReceiveHandler>>,
    cancel: CancellationToken,
    destroyed: AtomicBool,
}

impl GossipEngine {
    /// Build the engine and spawn its inbound worker and pruner tasks.
    ///
    /// Fails fast when `require_ownership_proof` is set without an issuer.
    pub fn new(
        cfg: GossipConfig,
        witness: Arc<dyn Witness>,
        issuer: Option<Arc<dyn Issuer>>,
        metrics: Arc<Metrics>,
    ) -> Result<Arc<Self>, GossipError> {
        if cfg.require_ownership_proof && issuer.is_none() {
            return Err(GossipError::MissingIssuer);
        }

        let (inbound_tx, inbound_rx) = mpsc::channel(cfg.inbound_capacity.max(1));
        let engine = Arc::new(Self {
            inner: Mutex::new(EngineInner {
                store: NullifierStore::new(cfg.max_nullifiers, cfg.max_nullifier_age),
                ledger: PeerLedger::new(cfg.peer_score_threshold),
                peers: BTreeMap::new(),
            }),
            cfg,
            witness,
            issuer,
            metrics,
            inbound_tx,
            handler: StdMutex::new(None),
            cancel: CancellationToken::new(),
            destroyed: AtomicBool::new(false),
        });

        Self::spawn_inbound_worker(Arc::downgrade(&engine), inbound_rx);
        Self::spawn_pruner(Arc::downgrade(&engine), engine.cfg.prune_interval);

        Ok(engine)
    }

    fn spawn_inbound_worker(weak: Weak<Self>, mut rx: mpsc::Receiver<InboundFrame>) {
        let cancel = match weak.upgrade() {
            Some(e) => e.cancel.clone(),
            None => return,
        };
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    item = rx.recv() => {
                        let Some(InboundFrame { from, frame }) = item else { break };
                        let Some(engine) = weak.upgrade() else { break };
                        match wire::decode_frame(&frame) {
                            Ok(msg) => {
                                let _ = engine.on_receive(msg, from.as_deref()).await;
                            }
                            Err(err) => {
                                debug!(?err, from = from.as_deref(), "malformed inbound frame");
                                let mut inner = engine.inner.lock().await;
                                engine.penalize(&mut inner, from.as_deref(), Offense::MalformedMessage);
                                engine.metrics.nullifiers_rejected_total.inc();
                            }
                        }
                    }
                }
            }
            debug!("inbound worker stopped");
        });
    }

    fn spawn_pruner(weak: Weak<Self>, interval: Duration) {
        let cancel = match weak.upgrade() {
            Some(e) => e.cancel.clone(),
            None => return,
        };
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately; consume that tick.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(engine) = weak.upgrade() else { break };
                        engine.run_prune().await;
                    }
                }
            }
            debug!("pruner stopped");
        });
    }

    /// One pruning pass: age expiry, then hard-cap eviction oldest-first.
    pub async fn run_prune(&self) {
        let mut inner = self.inner.lock().await;
        let (expired, evicted) = inner.store.prune(now_ms());
        self.metrics.nullifiers_stored.set(inner.store.len() as i64);
        if expired + evicted > 0 {
            self.metrics
                .records_pruned_total
                .inc_by((expired + evicted) as u64);
        }
        if evicted > 0 {
            warn!(
                evicted,
                cap = self.cfg.max_nullifiers,
                "hard-cap eviction; double-spend window widens under flood"
            );
        } else if expired > 0 {
            debug!(expired, "aged nullifier records pruned");
        }
    }

    /// Publish a locally derived nullifier: record, broadcast, notify.
    ///
    /// Fails `DoubleSpendLocal` if the nullifier is already known here.
    /// Per-peer send failures are logged and do not fail the publish; the
    /// record is already stored.
    pub async fn publish(
        &self,
        nullifier: Nullifier,
        proof: Attestation,
    ) -> Result<usize, GossipError> {
        self.publish_with_proof(nullifier, proof, None).await
    }

    /// `publish` with an issuer-bound ownership proof attached, for meshes
    /// running `require_ownership_proof`.
    pub async fn publish_with_proof(
        &self,
        nullifier: Nullifier,
        proof: Attestation,
        ownership_proof: Option<Vec<u8>>,
    ) -> Result<usize, GossipError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(GossipError::Destroyed);
        }
        let now = now_ms();

        let (frame, peers) = {
            let mut inner = self.inner.lock().await;
            if inner.store.contains(&nullifier) {
                return Err(GossipError::DoubleSpendLocal(nullifier));
            }
            inner.store.insert_first(&nullifier, proof.clone(), now);
            self.metrics.nullifiers_stored.set(inner.store.len() as i64);

            let msg = GossipMessage::Nullifier {
                nullifier,
                proof: proof.clone(),
                timestamp: now,
                ownership_proof,
            };
            (wire::encode_frame(&msg)?, inner.connected_peers())
        };

        let delivered = self.broadcast(&frame, &peers, None, true).await;
        debug!(nullifier = %nullifier, delivered, peers = peers.len(), "published");
        self.notify_handler(&nullifier, &proof);
        Ok(delivered)
    }

    /// Run the admission pipeline on one decoded message.
    ///
    /// Checks run in strict order; the first failure stops processing and
    /// penalizes the sender. Collaborator errors count as failed checks
    /// (safer default), never as acceptance.
    pub async fn on_receive(&self, msg: GossipMessage, from: Option<&str>) -> Admission {
        if self.destroyed.load(Ordering::SeqCst) {
            return Admission::Ignored;
        }
        let GossipMessage::Nullifier {
            nullifier,
            proof,
            ownership_proof,
            ..
        } = msg;
        let now = now_ms();

        let mut inner = self.inner.lock().await;

        // Frames from peers we do not track are a transport anomaly
        // (already disconnected, or never registered); drop them.
        if let Some(id) = from {
            if !inner.peers.contains_key(id) {
                debug!(peer = id, "frame from untracked peer dropped");
                return Admission::Ignored;
            }
        }

        // 1. Shape: the decoder produced the tagged variant; the parallel
        //    signature/id lists are the remaining structural invariant.
        if !proof.is_well_formed() {
            return self.reject(&mut inner, from, Offense::MalformedMessage);
        }

        // 2. Timestamp window. Witness clock on the proof, local clock for
        //    "now"; the pruner uses first_seen (local) instead.
        let max_future = self.cfg.max_timestamp_future.as_millis() as u64;
        let max_age = self.cfg.max_nullifier_age.as_millis() as u64;
        if proof.timestamp > now.saturating_add(max_future) {
            return self.reject(&mut inner, from, Offense::FutureTimestamp);
        }
        if now.saturating_sub(proof.timestamp) > max_age {
            return self.reject(&mut inner, from, Offense::ExpiredTimestamp);
        }

        // 3. Duplicate: bump the count, mildly penalize the repeat sender.
        if inner.store.contains(&nullifier) {
            let count = inner.store.bump(&nullifier).unwrap_or(1);
            self.metrics.nullifiers_duplicate_total.inc();
            self.penalize(&mut inner, from, Offense::DuplicateNullifier);
            return Admission::Duplicate(count);
        }

        // 4. Witness verification. Suspension point; the lock stays held so
        //    a concurrent admission of the same nullifier cannot slip
        //    between the duplicate check and the insert below.
        match self.witness.verify(&proof).await {
            Ok(true) => {}
            Ok(false) => return self.reject(&mut inner, from, Offense::InvalidWitnessProof),
            Err(err) => {
                warn!(?err, "witness verify failed; treating as invalid");
                return self.reject(&mut inner, from, Offense::InvalidWitnessProof);
            }
        }

        // 5. Ownership proof, when the mesh demands it.
        if self.cfg.require_ownership_proof {
            // Constructor guarantees an issuer when the flag is set.
            let Some(issuer) = self.issuer.as_ref() else {
                return self.reject(&mut inner, from, Offense::MissingOwnershipProof);
            };
            let Some(op) = ownership_proof.as_deref() else {
                return self.reject(&mut inner, from, Offense::MissingOwnershipProof);
            };
            match issuer.verify_ownership_proof(op, &nullifier).await {
                Ok(true) => {}
                Ok(false) => {
                    return self.reject(&mut inner, from, Offense::InvalidOwnershipProof)
                }
                Err(err) => {
                    warn!(?err, "ownership verify failed; treating as invalid");
                    return self.reject(&mut inner, from, Offense::InvalidOwnershipProof);
                }
            }
        }

        // 6. Accept: record, reward, rebroadcast, notify.
        inner.store.insert_first(&nullifier, proof.clone(), now);
        self.metrics.nullifiers_stored.set(inner.store.len() as i64);
        self.metrics.nullifiers_accepted_total.inc();
        if let Some(id) = from {
            inner.ledger.reward(id, now);
        }
        let peers = inner.connected_peers();
        drop(inner);

        let msg = GossipMessage::Nullifier {
            nullifier,
            proof: proof.clone(),
            timestamp: now,
            ownership_proof,
        };
        match wire::encode_frame(&msg) {
            Ok(frame) => {
                let _ = self.broadcast(&frame, &peers, from, false).await;
            }
            Err(err) => warn!(?err, "rebroadcast encode failed"),
        }
        self.notify_handler(&nullifier, &proof);
        Admission::Accepted
    }

    /// Propagation confidence for a nullifier: fraction of live peers that
    /// reported it, in [0, 1]; 0 when unseen. This is propagation evidence,
    /// not a double-spend probability.
    pub async fn check_nullifier(&self, nullifier: &Nullifier) -> f64 {
        let inner = self.inner.lock().await;
        let Some(rec) = inner.store.get(nullifier) else {
            return 0.0;
        };
        let total = inner.peers.len().max(1);
        (f64::from(rec.peer_count) / total as f64).min(1.0)
    }

    /// Snapshot one record.
    pub async fn record(&self, nullifier: &Nullifier) -> Option<NullifierRecord> {
        self.inner.lock().await.store.get(nullifier).cloned()
    }

    /// Currently registered peer count.
    pub async fn peer_count(&self) -> usize {
        self.inner.lock().await.peers.len()
    }

    /// Register a peer and track its subnet.
    pub async fn add_peer(&self, peer: Arc<dyn Peer>) {
        let now = now_ms();
        let mut inner = self.inner.lock().await;
        let id = peer.id().to_string();
        let addr = peer.remote_address().map(str::to_string);
        inner.peers.insert(id.clone(), peer);
        inner.ledger.track(&id, addr.as_deref(), now);
        self.metrics.gossip_peers.set(inner.peers.len() as i64);
        info!(peer = %id, "peer added");
    }

    /// Unregister a peer and drop its ledger state.
    pub async fn remove_peer(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let removed = inner.peers.remove(id).is_some();
        if removed {
            inner.ledger.forget(id);
            self.metrics.gossip_peers.set(inner.peers.len() as i64);
            info!(peer = id, "peer removed");
        }
        removed
    }

    /// Current score for a peer, if tracked.
    pub async fn peer_score(&self, id: &str) -> Option<i32> {
        self.inner.lock().await.ledger.score_of(id)
    }

    /// Handler invoked for every locally published or newly admitted
    /// nullifier.
    pub fn set_receive_handler<F>(&self, handler: F)
    where
        F: Fn(&Nullifier, &Attestation) + Send + Sync + 'static,
    {
        *self.handler.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(handler));
    }

    /// Sender side of the inbound frame channel, for transport adapters.
    pub fn inbound_sender(&self) -> mpsc::Sender<InboundFrame> {
        self.inbound_tx.clone()
    }

    /// Engine counters.
    pub async fn stats(&self) -> GossipStats {
        let inner = self.inner.lock().await;
        GossipStats {
            known_nullifiers: inner.store.len(),
            connected_peers: inner.peers.len(),
            tracked_scores: inner.ledger.len(),
        }
    }

    /// Subnet -> peer count, for Sybil monitoring.
    pub async fn subnet_stats(&self) -> BTreeMap<String, usize> {
        self.inner.lock().await.ledger.subnet_stats()
    }

    /// Stop background work. In-flight publishes and admissions run to
    /// completion; subsequent calls are rejected (`publish`) or ignored
    /// (`on_receive`).
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        info!("gossip engine destroyed");
    }

    /// Whether `destroy` has been called.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn reject(
        &self,
        inner: &mut EngineInner,
        from: Option<&str>,
        offense: Offense,
    ) -> Admission {
        self.metrics.nullifiers_rejected_total.inc();
        self.penalize(inner, from, offense);
        Admission::Rejected(offense)
    }

    fn penalize(&self, inner: &mut EngineInner, from: Option<&str>, offense: Offense) {
        let Some(id) = from else { return };
        // Scores exist only for tracked peers; anything else has already
        // been dropped at the transport.
        if !inner.peers.contains_key(id) {
            return;
        }
        debug!(peer = id, offense = offense.label(), delta = offense.delta(), "penalty");
        if inner.ledger.punish(id, offense, now_ms()) == Decision::Disconnect {
            if let Some(peer) = inner.peers.remove(id) {
                peer.disconnect();
            }
            inner.ledger.forget(id);
            self.metrics.gossip_peers.set(inner.peers.len() as i64);
            self.metrics.peers_banned_total.inc();
            warn!(peer = id, threshold = self.cfg.peer_score_threshold, "peer disconnected for low score");
        }
    }

    /// Fan out one frame to all peers in parallel. Failures are logged
    /// (warn on the publish path, debug on rebroadcast) and swallowed.
    async fn broadcast(
        &self,
        frame: &[u8],
        peers: &[Arc<dyn Peer>],
        skip: Option<&str>,
        publishing: bool,
    ) -> usize {
        let sends = peers
            .iter()
            .filter(|p| skip != Some(p.id()))
            .map(|p| async move { (p.id().to_string(), p.send(frame).await) });

        let mut delivered = 0;
        for (id, result) in join_all(sends).await {
            match result {
                Ok(()) => delivered += 1,
                Err(err) => {
                    self.metrics.broadcast_failures_total.inc();
                    if publishing {
                        warn!(peer = %id, ?err, "publish send failed");
                    } else {
                        debug!(peer = %id, ?err, "rebroadcast send failed");
                    }
                }
            }
        }
        delivered
    }

    fn notify_handler(&self, nullifier: &Nullifier, proof: &Attestation) {
        let guard = self.handler.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handler) = guard.as_ref() {
            handler(nullifier, proof);
        }
    }
}

impl Drop for GossipEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
