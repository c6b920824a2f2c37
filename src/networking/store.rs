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
#![deny(missing_docs)]

//! Bounded nullifier record store.
//!
//! Insert-or-bump semantics: the first valid observation writes the record;
//! later observations only increment `peer_count`. Records age out after
//! `max_age` relative to `first_seen` (local clock). If the store still
//! exceeds `max_records` after age pruning, the oldest records are evicted
//! until the cap holds. The hard cap is a last-resort safety valve: it
//! trades a flood-induced double-spend window for bounded memory, which is
//! why evictions are reported separately from ordinary expiry.

use crate::core::types::{Attestation, Nullifier, NullifierRecord};
use std::collections::BTreeMap;
use std::time::Duration;

/// In-memory record store keyed by the nullifier's hex encoding.
pub struct NullifierStore {
    records: BTreeMap<String, NullifierRecord>,
    max_records: usize,
    max_age: Duration,
}

impl NullifierStore {
    /// Create a store with the given bounds.
    pub fn new(max_records: usize, max_age: Duration) -> Self {
        Self {
            records: BTreeMap::new(),
            max_records,
            max_age,
        }
    }

    /// Whether the nullifier is already recorded.
    pub fn contains(&self, nullifier: &Nullifier) -> bool {
        self.records.contains_key(&nullifier.to_hex())
    }

    /// Record count.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no records are held.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshot one record.
    pub fn get(&self, nullifier: &Nullifier) -> Option<&NullifierRecord> {
        self.records.get(&nullifier.to_hex())
    }

    /// First observation. Returns false (and leaves the record untouched)
    /// if the nullifier is already present; callers check `contains` first
    /// under the same lock.
    pub fn insert_first(
        &mut self,
        nullifier: &Nullifier,
        proof: Attestation,
        now_ms: u64,
    ) -> bool {
        let key = nullifier.to_hex();
        if self.records.contains_key(&key) {
            return false;
        }
        self.records.insert(
            key,
            NullifierRecord {
                nullifier: *nullifier,
                proof,
                first_seen: now_ms,
                peer_count: 1,
            },
        );
        true
    }

    /// Repeat observation: bump `peer_count`, never touch proof or
    /// `first_seen`. Returns the new count, or None if unknown.
    pub fn bump(&mut self, nullifier: &Nullifier) -> Option<u32> {
        let rec = self.records.get_mut(&nullifier.to_hex())?;
        rec.peer_count = rec.peer_count.saturating_add(1);
        Some(rec.peer_count)
    }

    /// Age-based pruning followed by hard-cap enforcement.
    ///
    /// Returns `(expired, evicted)`: records dropped because
    /// `first_seen < now - max_age`, and records dropped oldest-first to get
    /// back under `max_records`.
    pub fn prune(&mut self, now_ms: u64) -> (usize, usize) {
        let cutoff = now_ms.saturating_sub(self.max_age.as_millis() as u64);
        let before = self.records.len();
        self.records.retain(|_, rec| rec.first_seen >= cutoff);
        let expired = before - self.records.len();

        let mut evicted = 0;
        if self.records.len() > self.max_records {
            let mut by_age: Vec<(u64, String)> = self
                .records
                .iter()
                .map(|(k, r)| (r.first_seen, k.clone()))
                .collect();
            by_age.sort();
            let excess = self.records.len() - self.max_records;
            for (_, key) in by_age.into_iter().take(excess) {
                self.records.remove(&key);
                evicted += 1;
            }
        }

        (expired, evicted)
    }
}
