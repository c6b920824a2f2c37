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

//! In-process Ed25519 witness pool.
//!
//! Each member signs the domain-separated bytes
//! `"Nullmesh-Witness-Attest-v1" || timestamp_be || hash`, where `hash` is
//! the attestation binding digest over nullifier, timestamp, and
//! commitment. A pool with several members yields witness depth > 1 in a
//! single attestation. A pool constructed with `verifier` carries only the
//! public-key registry and can verify but not attest.

use crate::clients::{Witness, WitnessError};
use crate::core::types::{now_ms, Attestation, Commitment, Nullifier};
use async_trait::async_trait;
use ring::{
    rand::SystemRandom,
    signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519},
};
use std::collections::BTreeMap;

const WITNESS_SIGN_DOMAIN: &[u8] = b"Nullmesh-Witness-Attest-v1";

fn signing_bytes(timestamp: u64, hash: &[u8; 32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(WITNESS_SIGN_DOMAIN.len() + 8 + 32);
    out.extend_from_slice(WITNESS_SIGN_DOMAIN);
    out.extend_from_slice(&timestamp.to_be_bytes());
    out.extend_from_slice(hash);
    out
}

struct Member {
    id: String,
    keypair: Ed25519KeyPair,
}

/// Ed25519 witness pool with a registry of accepted witness public keys.
pub struct WitnessPool {
    members: Vec<Member>,
    // witness id -> Ed25519 public key bytes
    registry: BTreeMap<String, [u8; 32]>,
}

impl WitnessPool {
    /// Generate `n` fresh witness identities. Ids are the hex encodings of
    /// the Ed25519 public keys.
    pub fn generate(n: usize) -> Result<Self, WitnessError> {
        let rng = SystemRandom::new();
        let mut members = Vec::with_capacity(n);
        let mut registry = BTreeMap::new();
        for _ in 0..n {
            let pkcs8 =
                Ed25519KeyPair::generate_pkcs8(&rng).map_err(|_| WitnessError::Signing)?;
            let keypair =
                Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).map_err(|_| WitnessError::Signing)?;
            let mut pk = [0u8; 32];
            pk.copy_from_slice(keypair.public_key().as_ref());
            let id = hex::encode(pk);
            registry.insert(id.clone(), pk);
            members.push(Member { id, keypair });
        }
        Ok(Self { members, registry })
    }

    /// Verify-only pool holding just the public-key registry.
    pub fn verifier(registry: BTreeMap<String, [u8; 32]>) -> Self {
        Self {
            members: Vec::new(),
            registry,
        }
    }

    /// Public-key registry, for handing to verify-only nodes.
    pub fn registry(&self) -> BTreeMap<String, [u8; 32]> {
        self.registry.clone()
    }

    /// Number of signing members.
    pub fn depth(&self) -> usize {
        self.members.len()
    }
}

#[async_trait]
impl Witness for WitnessPool {
    async fn attest(
        &self,
        nullifier: &Nullifier,
        commitment: &Commitment,
    ) -> Result<Attestation, WitnessError> {
        if self.members.is_empty() {
            return Err(WitnessError::NoMembers);
        }

        let timestamp = now_ms();
        let hash = Attestation::binding_hash(nullifier, timestamp, commitment);
        let msg = signing_bytes(timestamp, &hash);

        let mut witness_ids = Vec::with_capacity(self.members.len());
        let mut signatures = Vec::with_capacity(self.members.len());
        for m in &self.members {
            witness_ids.push(m.id.clone());
            signatures.push(m.keypair.sign(&msg).as_ref().to_vec());
        }

        Ok(Attestation {
            timestamp,
            witness_ids,
            signatures,
            hash,
        })
    }

    async fn verify(&self, proof: &Attestation) -> Result<bool, WitnessError> {
        if !proof.is_well_formed() {
            return Ok(false);
        }
        // Empty attestations are permitted; downstream confidence suffers.
        let msg = signing_bytes(proof.timestamp, &proof.hash);
        for (id, sig) in proof.witness_ids.iter().zip(proof.signatures.iter()) {
            let Some(pk) = self.registry.get(id) else {
                return Ok(false);
            };
            if sig.len() != 64 {
                return Ok(false);
            }
            let key = UnparsedPublicKey::new(&ED25519, pk);
            if key.verify(&msg, sig).is_err() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
