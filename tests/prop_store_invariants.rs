// Copyright (c) 2026 Nullmesh
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

use proptest::prelude::*;
use std::time::Duration;

use nullmesh::core::types::{Attestation, Nullifier};
use nullmesh::networking::store::NullifierStore;

fn proof() -> Attestation {
    Attestation {
        timestamp: 0,
        witness_ids: vec![],
        signatures: vec![],
        hash: [0u8; 32],
    }
}

fn nullifier(i: u32) -> Nullifier {
    let mut b = [0u8; 32];
    b[..4].copy_from_slice(&i.to_be_bytes());
    Nullifier::from_bytes(b)
}

proptest! {
    // Law: after pruning (under the cap), a record survives iff it is
    // within max_age of the local clock.
    #[test]
    fn prune_safety(
        first_seen in proptest::collection::vec(0u64..20_000, 1..200),
        now in 10_000u64..30_000,
    ) {
        let max_age = Duration::from_millis(5_000);
        let mut store = NullifierStore::new(1_000, max_age);
        for (i, fs) in first_seen.iter().enumerate() {
            store.insert_first(&nullifier(i as u32), proof(), *fs);
        }

        store.prune(now);

        let cutoff = now.saturating_sub(5_000);
        for (i, fs) in first_seen.iter().enumerate() {
            let retained = store.get(&nullifier(i as u32)).is_some();
            prop_assert_eq!(retained, *fs >= cutoff, "first_seen={} cutoff={}", fs, cutoff);
        }
    }

    // Law: peer_count starts at 1 and only ever increases outside pruning.
    #[test]
    fn peer_count_is_monotone(bumps in 0u32..500) {
        let mut store = NullifierStore::new(16, Duration::from_secs(3600));
        let n = nullifier(0);
        store.insert_first(&n, proof(), 0);

        let mut last = store.get(&n).unwrap().peer_count;
        prop_assert_eq!(last, 1);
        for _ in 0..bumps {
            let next = store.bump(&n).unwrap();
            prop_assert!(next >= last);
            last = next;
        }
        // Re-insert attempts never reset the count.
        store.insert_first(&n, proof(), 999);
        prop_assert_eq!(store.get(&n).unwrap().peer_count, last);
    }

    // Law: hard-cap enforcement evicts exactly the oldest overflow and
    // preserves the survivors' counts.
    #[test]
    fn hard_cap_evicts_oldest_first(cap in 5usize..50, extra in 1usize..50) {
        let mut store = NullifierStore::new(cap, Duration::from_secs(1_000_000));
        let total = cap + extra;
        for i in 0..total {
            store.insert_first(&nullifier(i as u32), proof(), 1_000 + i as u64);
            store.bump(&nullifier(i as u32));
        }

        let (expired, evicted) = store.prune(2_000);
        prop_assert_eq!(expired, 0);
        prop_assert_eq!(evicted, extra);
        prop_assert_eq!(store.len(), cap);
        for i in 0..extra {
            prop_assert!(store.get(&nullifier(i as u32)).is_none());
        }
        for i in extra..total {
            prop_assert_eq!(store.get(&nullifier(i as u32)).unwrap().peer_count, 2);
        }
    }
}

// S6 shape: fill to max + 100 with strictly increasing first_seen, prune,
// exactly the 100 oldest go.
#[test]
fn hard_cap_scenario_exact_overflow() {
    let cap = 1_000;
    let mut store = NullifierStore::new(cap, Duration::from_secs(1_000_000));
    for i in 0..(cap + 100) {
        store.insert_first(&nullifier(i as u32), proof(), i as u64);
    }

    let (expired, evicted) = store.prune(cap as u64 + 100);
    assert_eq!(expired, 0);
    assert_eq!(evicted, 100);
    assert_eq!(store.len(), cap);
    for i in 0..100u32 {
        assert!(store.get(&nullifier(i)).is_none());
    }
    assert_eq!(store.get(&nullifier(100)).unwrap().peer_count, 1);
}
