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

//! Deterministic core types and canonical encoding helpers.

use bincode::Options;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Canonical serialization error.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("serialization")]
    Serialize,
    #[error("deserialization")]
    Deserialize,
    #[error("size limit exceeded")]
    TooLarge,
}

/// Canonical bincode options (deterministic).
fn bincode_opts() -> impl Options {
    // Fixint encoding provides a stable integer representation.
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Encode with deterministic rules. Requires deterministic container ordering (use BTreeMap/BTreeSet).
pub fn encode_canonical<T: Serialize>(v: &T) -> Result<Vec<u8>, CodecError> {
    bincode_opts()
        .serialize(v)
        .map_err(|_| CodecError::Serialize)
}

/// Decode with a hard size cap.
pub fn decode_canonical_limited<T: DeserializeOwned>(
    bytes: &[u8],
    max: usize,
) -> Result<T, CodecError> {
    // Fast-path cap on the raw wire payload.
    if bytes.len() > max {
        return Err(CodecError::TooLarge);
    }
    // Defensive cap inside the deserializer to prevent memory/CPU bombs via large container lengths.
    bincode_opts()
        .with_limit(max as u64)
        .deserialize(bytes)
        .map_err(|_| CodecError::Deserialize)
}

/// Milliseconds since UNIX epoch from the local clock (0 if unavailable).
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Unique, opaque 32-byte tag emitted on spending a token.
///
/// Two spends of the same token produce the same nullifier; re-observing a
/// nullifier is the double-spend signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Nullifier([u8; 32]);

impl Nullifier {
    /// Construct from raw bytes.
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }
    /// Return bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
    /// Lowercase hex, used as the record-store key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for Nullifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// 32-byte recipient-bound ciphertext seed carried in a transfer package.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment([u8; 32]);

impl Commitment {
    /// Construct from raw bytes.
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }
    /// Return bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

const ATTEST_HASH_DOMAIN: &[u8] = b"Nullmesh-Attest-Hash-v1";

/// Witness proof over a nullifier.
///
/// `signatures` and `witness_ids` are parallel lists; the empty attestation
/// is well formed but contributes zero witness depth downstream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// Witness wall clock, milliseconds since UNIX epoch.
    pub timestamp: u64,
    /// Ordered witness identifiers.
    pub witness_ids: Vec<String>,
    /// One opaque signature per witness id, same order.
    pub signatures: Vec<Vec<u8>>,
    /// Digest binding nullifier, timestamp, and commitment.
    pub hash: [u8; 32],
}

impl Attestation {
    /// Parallel-list invariant: one signature per witness id.
    pub fn is_well_formed(&self) -> bool {
        self.signatures.len() == self.witness_ids.len()
    }

    /// Number of witness signatures carried (confidence evidence).
    pub fn witness_depth(&self) -> usize {
        self.signatures.len()
    }

    /// Digest over nullifier || timestamp || commitment, domain separated.
    pub fn binding_hash(
        nullifier: &Nullifier,
        timestamp: u64,
        commitment: &Commitment,
    ) -> [u8; 32] {
        let mut h = Sha256::new();
        h.update(ATTEST_HASH_DOMAIN);
        h.update(nullifier.as_bytes());
        h.update(timestamp.to_be_bytes());
        h.update(commitment.as_bytes());
        h.finalize().into()
    }
}

/// Immutable package handed from spender to recipient.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferPackage {
    /// Spend tag, already published to gossip by the spender.
    pub nullifier: Nullifier,
    /// Recipient-bound seed for deriving the successor owner secret.
    pub commitment: Commitment,
    /// Witness attestation over the spend.
    pub proof: Attestation,
    /// Optional issuer-bound ownership proof.
    pub ownership_proof: Option<Vec<u8>>,
}

/// Entry in the gossip record store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NullifierRecord {
    /// The observed nullifier.
    pub nullifier: Nullifier,
    /// Proof from the first valid observation; never overwritten.
    pub proof: Attestation,
    /// Local clock at first observation (ms). Prune key.
    pub first_seen: u64,
    /// Distinct observations; starts at 1, only ever increments.
    pub peer_count: u32,
}
