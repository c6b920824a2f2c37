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

//! Peer reputation ledger.
//!
//! Deterministic, integer-only scoring: rewards are +1 capped at +100,
//! offenses carry fixed negative deltas, and a peer whose score falls below
//! the threshold is disconnected and forgotten. Subnet tracking groups
//! peers by IPv4 /24 (first three octets) or the first three IPv6 groups;
//! three or more peers in one subnet raises a warning without rejecting
//! (anti-Sybil signal, not a hard rule).

use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, SocketAddr};
use tracing::warn;

/// Upper clip for peer scores.
pub const SCORE_CEILING: i32 = 100;

/// Peers sharing a subnet at or above this count trigger a warning.
pub const SUBNET_WARN_THRESHOLD: usize = 3;

/// Admission offenses and their score deltas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Offense {
    /// Frame failed the shape check / decoder.
    MalformedMessage,
    /// Re-sent an already-seen nullifier.
    DuplicateNullifier,
    /// Proof timestamp older than the admission window (replay attempt).
    ExpiredTimestamp,
    /// Proof timestamp too far ahead of local time (pre-mining spam).
    FutureTimestamp,
    /// Mesh requires ownership proofs and none was attached.
    MissingOwnershipProof,
    /// Attached ownership proof failed issuer verification.
    InvalidOwnershipProof,
    /// Witness attestation failed verification (forgery attempt).
    InvalidWitnessProof,
}

impl Offense {
    /// Additive score delta (negative).
    pub fn delta(&self) -> i32 {
        match self {
            Offense::MalformedMessage => -2,
            Offense::DuplicateNullifier => -1,
            Offense::ExpiredTimestamp => -2,
            Offense::FutureTimestamp => -5,
            Offense::MissingOwnershipProof => -5,
            Offense::InvalidOwnershipProof => -8,
            Offense::InvalidWitnessProof => -10,
        }
    }

    /// Stable label for logs and stats.
    pub fn label(&self) -> &'static str {
        match self {
            Offense::MalformedMessage => "malformed_message",
            Offense::DuplicateNullifier => "duplicate_nullifier",
            Offense::ExpiredTimestamp => "expired_timestamp",
            Offense::FutureTimestamp => "future_timestamp",
            Offense::MissingOwnershipProof => "missing_ownership_proof",
            Offense::InvalidOwnershipProof => "invalid_ownership_proof",
            Offense::InvalidWitnessProof => "invalid_witness_proof",
        }
    }
}

/// Verdict after applying an offense.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Peer stays connected.
    Keep,
    /// Score crossed the threshold; disconnect and forget the peer.
    Disconnect,
}

/// Per-peer score and counters.
#[derive(Clone, Debug, Default)]
pub struct PeerScore {
    /// Current score, clipped at +100 upward.
    pub score: i32,
    /// Witness/ownership proof failures.
    pub invalid_proofs: u64,
    /// Duplicate nullifier observations.
    pub duplicates: u64,
    /// Accepted messages.
    pub valid_messages: u64,
    /// Last activity, local clock ms.
    pub last_seen: u64,
}

/// Score ledger plus subnet bookkeeping for all tracked peers.
pub struct PeerLedger {
    scores: BTreeMap<String, PeerScore>,
    subnets: BTreeMap<String, BTreeSet<String>>,
    peer_subnet: BTreeMap<String, String>,
    threshold: i32,
}

impl PeerLedger {
    /// Create a ledger with the given disconnect threshold (e.g. -50).
    pub fn new(threshold: i32) -> Self {
        Self {
            scores: BTreeMap::new(),
            subnets: BTreeMap::new(),
            peer_subnet: BTreeMap::new(),
            threshold,
        }
    }

    /// Start tracking a peer. Returns the number of tracked peers now in
    /// its subnet (0 when the address yields no subnet).
    pub fn track(&mut self, peer: &str, remote_addr: Option<&str>, now_ms: u64) -> usize {
        self.scores.entry(peer.to_string()).or_default().last_seen = now_ms;

        let Some(subnet) = remote_addr.and_then(subnet_of) else {
            return 0;
        };
        let members = self.subnets.entry(subnet.clone()).or_default();
        members.insert(peer.to_string());
        self.peer_subnet.insert(peer.to_string(), subnet.clone());
        let count = members.len();
        if count >= SUBNET_WARN_THRESHOLD {
            warn!(subnet = %subnet, peers = count, "subnet concentration; possible sybil cluster");
        }
        count
    }

    /// Reward a valid message (+1, clipped at the ceiling).
    pub fn reward(&mut self, peer: &str, now_ms: u64) {
        let st = self.scores.entry(peer.to_string()).or_default();
        st.score = st.score.saturating_add(1).min(SCORE_CEILING);
        st.valid_messages += 1;
        st.last_seen = now_ms;
    }

    /// Apply an offense. On a threshold crossing the score record is
    /// deleted and `Disconnect` returned; subnet membership is kept until
    /// `forget` so reconnect storms stay visible.
    pub fn punish(&mut self, peer: &str, offense: Offense, now_ms: u64) -> Decision {
        let st = self.scores.entry(peer.to_string()).or_default();
        st.score = st.score.saturating_add(offense.delta());
        st.last_seen = now_ms;
        match offense {
            Offense::DuplicateNullifier => st.duplicates += 1,
            Offense::InvalidWitnessProof
            | Offense::InvalidOwnershipProof
            | Offense::MissingOwnershipProof => st.invalid_proofs += 1,
            _ => {}
        }

        if st.score < self.threshold {
            self.scores.remove(peer);
            Decision::Disconnect
        } else {
            Decision::Keep
        }
    }

    /// Drop all state for a peer (disconnect cleanup).
    pub fn forget(&mut self, peer: &str) {
        self.scores.remove(peer);
        if let Some(subnet) = self.peer_subnet.remove(peer) {
            if let Some(members) = self.subnets.get_mut(&subnet) {
                members.remove(peer);
                if members.is_empty() {
                    self.subnets.remove(&subnet);
                }
            }
        }
    }

    /// Current score, if tracked.
    pub fn score_of(&self, peer: &str) -> Option<i32> {
        self.scores.get(peer).map(|s| s.score)
    }

    /// Full score entry, if tracked.
    pub fn entry(&self, peer: &str) -> Option<&PeerScore> {
        self.scores.get(peer)
    }

    /// Number of tracked score records.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// True when no peers are tracked.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Subnet -> tracked peer count.
    pub fn subnet_stats(&self) -> BTreeMap<String, usize> {
        self.subnets
            .iter()
            .map(|(k, v)| (k.clone(), v.len()))
            .collect()
    }
}

/// Subnet key: IPv4 /24 ("a.b.c") or first three IPv6 groups ("a:b:c").
/// Accepts bare IPs or socket addresses; unparseable input yields None.
pub fn subnet_of(addr: &str) -> Option<String> {
    let ip: IpAddr = addr
        .parse::<SocketAddr>()
        .map(|sa| sa.ip())
        .or_else(|_| addr.parse::<IpAddr>())
        .ok()?;

    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            Some(format!("{}.{}.{}", o[0], o[1], o[2]))
        }
        IpAddr::V6(v6) => {
            let s = v6.segments();
            Some(format!("{:x}:{:x}:{:x}", s[0], s[1], s[2]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_clips_at_ceiling() {
        let mut ledger = PeerLedger::new(-50);
        for _ in 0..200 {
            ledger.reward("p", 1);
        }
        assert_eq!(ledger.score_of("p"), Some(SCORE_CEILING));
        assert_eq!(ledger.entry("p").unwrap().valid_messages, 200);
    }

    #[test]
    fn forgery_ladder_disconnects_on_sixth_message() {
        let mut ledger = PeerLedger::new(-50);
        for i in 1..=5 {
            let d = ledger.punish("p", Offense::InvalidWitnessProof, i);
            assert_eq!(d, Decision::Keep, "message {i} should not disconnect yet");
        }
        assert_eq!(ledger.score_of("p"), Some(-50));
        assert_eq!(
            ledger.punish("p", Offense::InvalidWitnessProof, 6),
            Decision::Disconnect
        );
        // Score record deleted on disconnect.
        assert_eq!(ledger.score_of("p"), None);
    }

    #[test]
    fn offense_deltas_match_policy() {
        assert_eq!(Offense::DuplicateNullifier.delta(), -1);
        assert_eq!(Offense::ExpiredTimestamp.delta(), -2);
        assert_eq!(Offense::FutureTimestamp.delta(), -5);
        assert_eq!(Offense::MissingOwnershipProof.delta(), -5);
        assert_eq!(Offense::InvalidOwnershipProof.delta(), -8);
        assert_eq!(Offense::InvalidWitnessProof.delta(), -10);
    }

    #[test]
    fn subnet_grouping_v4_and_v6() {
        assert_eq!(subnet_of("203.0.113.7:9001").as_deref(), Some("203.0.113"));
        assert_eq!(subnet_of("203.0.113.9"), subnet_of("203.0.113.200:80"));
        assert_eq!(
            subnet_of("2001:db8:85a3::8a2e:370:7334").as_deref(),
            Some("2001:db8:85a3")
        );
        assert_eq!(subnet_of("not an address"), None);
    }

    #[test]
    fn subnet_counts_accumulate_and_forget() {
        let mut ledger = PeerLedger::new(-50);
        assert_eq!(ledger.track("a", Some("10.1.2.3:1"), 0), 1);
        assert_eq!(ledger.track("b", Some("10.1.2.4:1"), 0), 2);
        assert_eq!(ledger.track("c", Some("10.1.2.5:1"), 0), 3);
        assert_eq!(ledger.subnet_stats().get("10.1.2"), Some(&3));

        ledger.forget("b");
        assert_eq!(ledger.subnet_stats().get("10.1.2"), Some(&2));
    }
}
