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

//! In-process VOPRF issuer.
//!
//! Evaluates `B = A * k` on a blinded element and proves discrete-log
//! equality with its public key `Y = G * k` using the same Fiat-Shamir
//! transcript the client verifies in [`crate::core::crypto::voprf`].
//! Ownership proofs are a keyed SHA-256 MAC over the nullifier; only the
//! issuer can mint or check them.

use crate::clients::{Issuer, IssuerError};
use crate::core::crypto::{curve, voprf};
use crate::core::types::Nullifier;
use async_trait::async_trait;
use base64::Engine;
use p256::{ProjectivePoint, Scalar};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const OWNERSHIP_MAC_DOMAIN: &[u8] = b"Nullmesh-Ownership-v1";

/// Issuer with an in-memory P-256 key. One instance per issuing authority.
pub struct LocalIssuer {
    key: Scalar,
    public: ProjectivePoint,
    mac_key: [u8; 32],
}

impl LocalIssuer {
    /// Generate a fresh issuer key and ownership MAC key.
    pub fn generate() -> Self {
        let key = *curve::random_scalar();
        let public = curve::generator() * key;
        let mut mac_key = [0u8; 32];
        OsRng.fill_bytes(&mut mac_key);
        Self {
            key,
            public,
            mac_key,
        }
    }

    fn ownership_mac(&self, nullifier: &Nullifier) -> [u8; 32] {
        let mut h = Sha256::new();
        h.update(OWNERSHIP_MAC_DOMAIN);
        h.update(self.mac_key);
        h.update(nullifier.as_bytes());
        h.finalize().into()
    }

    /// Mint the ownership proof a spender attaches to its gossip message.
    pub fn make_ownership_proof(&self, nullifier: &Nullifier) -> Vec<u8> {
        self.ownership_mac(nullifier).to_vec()
    }
}

#[async_trait]
impl Issuer for LocalIssuer {
    async fn issue_token(&self, blinded: &[u8], context: &[u8]) -> Result<Vec<u8>, IssuerError> {
        let a = curve::decode_point(blinded).map_err(|_| IssuerError::InvalidBlindedElement)?;
        let b = a * self.key;

        // Chaum-Pedersen prover: commit with a fresh nonce, then respond.
        let t = *curve::random_scalar();
        let t1 = curve::generator() * t;
        let t2 = a * t;
        let c = voprf::dleq_challenge(&self.public, &a, &b, &t1, &t2, context)
            .map_err(|_| IssuerError::InvalidBlindedElement)?;
        let s = t + c * self.key;

        let mut out = Vec::with_capacity(voprf::TOKEN_LEN);
        out.extend_from_slice(blinded);
        out.extend_from_slice(
            &curve::encode_point(&b).map_err(|_| IssuerError::InvalidBlindedElement)?,
        );
        out.extend_from_slice(&curve::encode_scalar(&c));
        out.extend_from_slice(&curve::encode_scalar(&s));
        Ok(out)
    }

    fn public_key(&self) -> String {
        // Infallible: Y = G * k with k non-zero is never the identity.
        let bytes = curve::encode_point(&self.public).unwrap_or([0u8; curve::POINT_LEN]);
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    async fn verify_ownership_proof(
        &self,
        proof: &[u8],
        nullifier: &Nullifier,
    ) -> Result<bool, IssuerError> {
        if proof.len() != 32 {
            return Ok(false);
        }
        let expected = self.ownership_mac(nullifier);
        Ok(expected.as_slice().ct_eq(proof).into())
    }
}
