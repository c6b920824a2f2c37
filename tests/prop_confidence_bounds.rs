// Copyright (c) 2026 Nullmesh
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

use proptest::prelude::*;
use std::time::Duration;

use nullmesh::core::validate::confidence::{ConfidenceEvidence, ConfidenceWeights};

proptest! {
    // Law: confidence stays in [0, 1] for any evidence, hostile included.
    #[test]
    fn confidence_is_bounded(
        peers in -1.0e9f64..1.0e9,
        depth in 0usize..100_000,
        wait_ms in 0u64..100_000_000,
    ) {
        let w = ConfidenceWeights::default();
        let c = w.score(&ConfidenceEvidence {
            gossip_peers: peers,
            witness_depth: depth,
            waited: Duration::from_millis(wait_ms),
        });
        prop_assert!((0.0..=1.0).contains(&c), "confidence {}", c);
    }

    // Law: each component saturates at its cap (0.5 / 0.3 / 0.2).
    #[test]
    fn peer_component_caps_at_half(peers in 0.0f64..1.0e9) {
        let w = ConfidenceWeights::default();
        let c = w.score(&ConfidenceEvidence {
            gossip_peers: peers,
            witness_depth: 0,
            waited: Duration::ZERO,
        });
        prop_assert!(c <= 0.5 + 1e-12);
    }

    #[test]
    fn witness_component_caps_at_three_tenths(depth in 0usize..100_000) {
        let w = ConfidenceWeights::default();
        let c = w.score(&ConfidenceEvidence {
            gossip_peers: 0.0,
            witness_depth: depth,
            waited: Duration::ZERO,
        });
        prop_assert!(c <= 0.3 + 1e-12);
    }

    #[test]
    fn time_component_caps_at_one_fifth(wait_ms in 0u64..100_000_000) {
        let w = ConfidenceWeights::default();
        let c = w.score(&ConfidenceEvidence {
            gossip_peers: 0.0,
            witness_depth: 0,
            waited: Duration::from_millis(wait_ms),
        });
        prop_assert!(c <= 0.2 + 1e-12);
    }

    // More evidence never lowers confidence.
    #[test]
    fn confidence_is_monotone_in_peers(
        a in 0.0f64..10_000.0,
        b in 0.0f64..10_000.0,
        depth in 0usize..10,
        wait_ms in 0u64..20_000,
    ) {
        let w = ConfidenceWeights::default();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let score = |peers: f64| w.score(&ConfidenceEvidence {
            gossip_peers: peers,
            witness_depth: depth,
            waited: Duration::from_millis(wait_ms),
        });
        prop_assert!(score(lo) <= score(hi) + 1e-12);
    }
}
