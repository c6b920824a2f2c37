// Copyright (c) 2026 Nullmesh
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Confidence scoring: fuse gossip propagation, witness depth, and elapsed
//! wait into a scalar in [0, 1].
//!
//! The weights are the tuning surface of the whole validation policy; they
//! are data, not logic.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Evidence gathered for one nullifier.
#[derive(Clone, Copy, Debug)]
pub struct ConfidenceEvidence {
    /// Absolute number of peers that reported the nullifier.
    pub gossip_peers: f64,
    /// Witness signatures on the attestation.
    pub witness_depth: usize,
    /// How long the validator waited for propagation.
    pub waited: Duration,
}

/// Scoring weights. Defaults: one percentage point per reporting peer up
/// to 50%, witness depth saturating at 3 signatures for 30%, wait
/// saturating at 10 s for 20%.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    /// Cap on the peer component.
    pub peer_cap: f64,
    /// Peer count at which the peer component saturates.
    pub peer_divisor: f64,
    /// Cap on the witness component.
    pub witness_cap: f64,
    /// Witness depth at which the witness component saturates.
    pub witness_divisor: f64,
    /// Cap on the wait component.
    pub time_cap: f64,
    /// Wait (ms) at which the time component saturates.
    pub time_divisor_ms: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            peer_cap: 0.5,
            peer_divisor: 100.0,
            witness_cap: 0.3,
            witness_divisor: 3.0,
            time_cap: 0.2,
            time_divisor_ms: 10_000.0,
        }
    }
}

impl ConfidenceWeights {
    /// Combine the evidence. Each component is clamped to its cap and the
    /// sum to [0, 1], whatever the inputs.
    ///
    /// Peer evidence counts 1% per reporter up to the cap; witness and wait
    /// evidence ramp linearly to their saturation points (3 signatures,
    /// 10 s) and earn their full cap there.
    pub fn score(&self, evidence: &ConfidenceEvidence) -> f64 {
        let peers = evidence.gossip_peers.max(0.0);
        let peer_score = (peers / self.peer_divisor.max(f64::MIN_POSITIVE)).min(self.peer_cap);
        let witness_score = (evidence.witness_depth as f64
            / self.witness_divisor.max(f64::MIN_POSITIVE))
        .min(1.0)
            * self.witness_cap;
        let time_score = (evidence.waited.as_millis() as f64
            / self.time_divisor_ms.max(f64::MIN_POSITIVE))
        .min(1.0)
            * self.time_cap;

        (peer_score + witness_score + time_score).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn five_peer_standard_wait_lands_below_default_threshold() {
        // Five reporters, three witnesses, 5 s wait: 0.05 + 0.3 + 0.1.
        let w = ConfidenceWeights::default();
        let c = w.score(&ConfidenceEvidence {
            gossip_peers: 5.0,
            witness_depth: 3,
            waited: Duration::from_millis(5_000),
        });
        assert!(close(c, 0.45), "got {c}");
    }

    #[test]
    fn large_network_saturates_the_peer_component() {
        // 200 reporters: peer component caps at 0.5 -> 0.9 total.
        let w = ConfidenceWeights::default();
        let c = w.score(&ConfidenceEvidence {
            gossip_peers: 200.0,
            witness_depth: 3,
            waited: Duration::from_millis(5_000),
        });
        assert!(close(c, 0.9), "got {c}");
    }

    #[test]
    fn caps_hold_individually() {
        let w = ConfidenceWeights::default();
        let c = w.score(&ConfidenceEvidence {
            gossip_peers: 1e9,
            witness_depth: 1_000,
            waited: Duration::from_secs(3600),
        });
        assert!(close(c, 1.0), "got {c}");
    }

    #[test]
    fn zero_evidence_scores_zero() {
        let w = ConfidenceWeights::default();
        let c = w.score(&ConfidenceEvidence {
            gossip_peers: 0.0,
            witness_depth: 0,
            waited: Duration::ZERO,
        });
        assert!(close(c, 0.0));
    }
}
