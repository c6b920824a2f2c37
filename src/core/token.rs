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

//! Token lifecycle: mint, transfer, receive.
//!
//! A token is a VOPRF-issued bearer credential plus 32 bytes of owner
//! secret material. Spending derives the nullifier
//! `H(owner_secret || recipient_pk)` (domain separated), so two spends of
//! the same token collide on the same nullifier regardless of recipient
//! count games. The local `spent` flag enforces at-most-once per token
//! instance; the authoritative global check is the gossip mesh.

use crate::clients::{decode_issuer_key, Issuer, IssuerError, Witness, WitnessError};
use crate::core::crypto::voprf::{self, VoprfError};
use crate::core::types::{Attestation, Commitment, Nullifier, TransferPackage};
use crate::networking::gossip::{GossipEngine, GossipError};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

const NULLIFIER_DOMAIN: &[u8] = b"Nullmesh-Nullifier-v1";
const COMMITMENT_DOMAIN: &[u8] = b"Nullmesh-Commit-v1";
const RECEIVE_DOMAIN: &[u8] = b"Nullmesh-Receive-v1";

/// Token lifecycle errors.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The token instance was already spent locally.
    #[error("token already spent")]
    AlreadySpent,
    /// Attestation malformed, unbound, or failed witness verification.
    #[error("invalid attestation")]
    InvalidAttestation,
    /// Issuer public key did not decode.
    #[error("invalid issuer public key")]
    InvalidIssuerKey,
    /// Witness collaborator failure.
    #[error("witness: {0}")]
    Witness(#[from] WitnessError),
    /// Issuer collaborator failure.
    #[error("issuer: {0}")]
    Issuer(#[from] IssuerError),
    /// Gossip failure (notably a local double spend on publish).
    #[error("gossip: {0}")]
    Gossip(#[from] GossipError),
    /// VOPRF verification failure.
    #[error("voprf: {0}")]
    Voprf(#[from] VoprfError),
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct OwnerSecret([u8; 32]);

/// A bearer token held by this node.
pub struct Token {
    id: String,
    amount: u64,
    voprf_token: Vec<u8>,
    spent: bool,
    owner_secret: OwnerSecret,
}

impl Token {
    /// Local identifier (not part of any wire format).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Denomination.
    pub fn amount(&self) -> u64 {
        self.amount
    }

    /// Whether this instance was spent locally.
    pub fn is_spent(&self) -> bool {
        self.spent
    }

    /// The verified 130-byte VOPRF credential.
    pub fn voprf_token(&self) -> &[u8] {
        &self.voprf_token
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // owner_secret deliberately omitted.
        f.debug_struct("Token")
            .field("id", &self.id)
            .field("amount", &self.amount)
            .field("spent", &self.spent)
            .finish()
    }
}

fn derive_tagged(domain: &[u8], secret: &[u8; 32], recipient_pk: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(domain);
    h.update(secret);
    h.update(recipient_pk);
    h.finalize().into()
}

fn fresh_id() -> String {
    let mut b = [0u8; 8];
    OsRng.fill_bytes(&mut b);
    hex::encode(b)
}

/// Mint/transfer/receive operations over the issuer, witness, and gossip
/// collaborators. Owns no shared state.
pub struct TokenService {
    issuer: Arc<dyn Issuer>,
    witness: Arc<dyn Witness>,
    gossip: Arc<GossipEngine>,
    context: Vec<u8>,
}

impl TokenService {
    /// Wire up a service. `context` domain-separates this deployment's
    /// VOPRF evaluations from any other use of the issuer key.
    pub fn new(
        issuer: Arc<dyn Issuer>,
        witness: Arc<dyn Witness>,
        gossip: Arc<GossipEngine>,
        context: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            issuer,
            witness,
            gossip,
            context: context.into(),
        }
    }

    /// Mint a fresh token: blind a new owner secret, have the issuer
    /// evaluate it, verify the DLEQ proof, keep the credential.
    pub async fn mint(&self, amount: u64) -> Result<Token, TokenError> {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        let token = self.issue_for_secret(&secret, amount).await;
        secret.zeroize();
        token
    }

    /// Spend a token towards `recipient_pk`: derive the nullifier, obtain a
    /// witness attestation, mark spent, publish to gossip.
    ///
    /// The `spent` flag flips before publish; a publish failure leaves the
    /// token spent, since the attestation already exists.
    pub async fn transfer(
        &self,
        token: &mut Token,
        recipient_pk: &[u8],
        ownership_proof: Option<Vec<u8>>,
    ) -> Result<TransferPackage, TokenError> {
        if token.spent {
            return Err(TokenError::AlreadySpent);
        }

        let nullifier = Nullifier::from_bytes(derive_tagged(
            NULLIFIER_DOMAIN,
            &token.owner_secret.0,
            recipient_pk,
        ));
        let commitment = Commitment::from_bytes(derive_tagged(
            COMMITMENT_DOMAIN,
            &token.owner_secret.0,
            recipient_pk,
        ));

        let proof = self.witness.attest(&nullifier, &commitment).await?;

        token.spent = true;
        self.gossip
            .publish_with_proof(nullifier, proof.clone(), ownership_proof.clone())
            .await?;
        info!(token = token.id(), nullifier = %nullifier, "token spent");

        Ok(TransferPackage {
            nullifier,
            commitment,
            proof,
            ownership_proof,
        })
    }

    /// Accept a transfer package: check the attestation binding and
    /// signatures, derive the successor owner secret from the recipient
    /// secret, and obtain a fresh verified credential for it.
    ///
    /// Callers run the transfer validator first; this method performs the
    /// cryptographic half of acceptance, not the propagation policy.
    pub async fn receive(
        &self,
        pkg: &TransferPackage,
        recipient_secret: &[u8; 32],
        amount: u64,
    ) -> Result<Token, TokenError> {
        if !pkg.proof.is_well_formed() {
            return Err(TokenError::InvalidAttestation);
        }
        let expected =
            Attestation::binding_hash(&pkg.nullifier, pkg.proof.timestamp, &pkg.commitment);
        if expected != pkg.proof.hash {
            return Err(TokenError::InvalidAttestation);
        }
        match self.witness.verify(&pkg.proof).await {
            Ok(true) => {}
            Ok(false) => return Err(TokenError::InvalidAttestation),
            Err(e) => return Err(TokenError::Witness(e)),
        }

        let mut successor = [0u8; 32];
        let mut h = Sha256::new();
        h.update(RECEIVE_DOMAIN);
        h.update(recipient_secret);
        h.update(pkg.commitment.as_bytes());
        successor.copy_from_slice(&h.finalize());

        let token = self.issue_for_secret(&successor, amount).await;
        successor.zeroize();
        debug!(nullifier = %pkg.nullifier, "transfer received");
        token
    }

    async fn issue_for_secret(&self, secret: &[u8; 32], amount: u64) -> Result<Token, TokenError> {
        let (blinded, state) = voprf::blind(secret, &self.context)?;
        let raw = self.issuer.issue_token(&blinded, &self.context).await?;
        let pubkey =
            decode_issuer_key(&self.issuer.public_key()).ok_or(TokenError::InvalidIssuerKey)?;
        let verified = voprf::finalize(&state, &raw, &pubkey, &self.context)?;

        Ok(Token {
            id: fresh_id(),
            amount,
            voprf_token: verified,
            spent: false,
            owner_secret: OwnerSecret(*secret),
        })
    }
}
