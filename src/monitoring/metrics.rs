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

use prometheus::{IntCounter, IntGauge, Registry};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus")]
    Prom,
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Connected peers gauge.
    pub gossip_peers: IntGauge,
    /// Nullifier records currently stored.
    pub nullifiers_stored: IntGauge,

    /// Nullifiers admitted through the full pipeline.
    pub nullifiers_accepted_total: IntCounter,
    /// Messages rejected by an admission check.
    pub nullifiers_rejected_total: IntCounter,
    /// Duplicate observations (peer-count bumps).
    pub nullifiers_duplicate_total: IntCounter,
    /// Peers disconnected for crossing the score threshold.
    pub peers_banned_total: IntCounter,
    /// Records removed by age pruning or hard-cap eviction.
    pub records_pruned_total: IntCounter,
    /// Individual peer send failures during broadcast.
    pub broadcast_failures_total: IntCounter,
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let gossip_peers = IntGauge::new("nullmesh_gossip_peers", "Connected peers")
            .map_err(|_| MetricsError::Prom)?;
        let nullifiers_stored =
            IntGauge::new("nullmesh_nullifiers_stored", "Nullifier records in store")
                .map_err(|_| MetricsError::Prom)?;

        let nullifiers_accepted_total = IntCounter::new(
            "nullmesh_nullifiers_accepted_total",
            "Nullifiers admitted through the pipeline",
        )
        .map_err(|_| MetricsError::Prom)?;
        let nullifiers_rejected_total = IntCounter::new(
            "nullmesh_nullifiers_rejected_total",
            "Messages rejected by an admission check",
        )
        .map_err(|_| MetricsError::Prom)?;
        let nullifiers_duplicate_total = IntCounter::new(
            "nullmesh_nullifiers_duplicate_total",
            "Duplicate nullifier observations",
        )
        .map_err(|_| MetricsError::Prom)?;
        let peers_banned_total =
            IntCounter::new("nullmesh_peers_banned_total", "Score-threshold disconnects")
                .map_err(|_| MetricsError::Prom)?;
        let records_pruned_total = IntCounter::new(
            "nullmesh_records_pruned_total",
            "Records removed by pruning or eviction",
        )
        .map_err(|_| MetricsError::Prom)?;
        let broadcast_failures_total = IntCounter::new(
            "nullmesh_broadcast_failures_total",
            "Per-peer send failures during broadcast",
        )
        .map_err(|_| MetricsError::Prom)?;

        registry
            .register(Box::new(gossip_peers.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(nullifiers_stored.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(nullifiers_accepted_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(nullifiers_rejected_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(nullifiers_duplicate_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(peers_banned_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(records_pruned_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(broadcast_failures_total.clone()))
            .map_err(|_| MetricsError::Prom)?;

        Ok(Self {
            registry,
            gossip_peers,
            nullifiers_stored,
            nullifiers_accepted_total,
            nullifiers_rejected_total,
            nullifiers_duplicate_total,
            peers_banned_total,
            records_pruned_total,
            broadcast_failures_total,
        })
    }
}
