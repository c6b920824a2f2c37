// Copyright (c) 2026 Nullmesh
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Issuer and witness collaborator interfaces.
//!
//! The gossip engine, validator, and token lifecycle talk to the issuer and
//! the witness service exclusively through these traits. Remote HTTP
//! implementations live outside this crate; the in-process implementations
//! here serve tests, demos, and single-host deployments.

use crate::core::types::{Attestation, Commitment, Nullifier};
use async_trait::async_trait;
use thiserror::Error;

pub mod issuer;
pub mod witness;

/// Witness collaborator errors.
#[derive(Debug, Error)]
pub enum WitnessError {
    /// Attestation was requested from a verify-only client.
    #[error("no witness members configured")]
    NoMembers,
    /// Signing failed.
    #[error("signing")]
    Signing,
    /// Transport/RPC failure talking to a remote witness.
    #[error("witness rpc: {0}")]
    Rpc(String),
}

/// Issuer collaborator errors.
#[derive(Debug, Error)]
pub enum IssuerError {
    /// Blinded element did not decode to a curve point.
    #[error("invalid blinded element")]
    InvalidBlindedElement,
    /// Transport/RPC failure talking to a remote issuer.
    #[error("issuer rpc: {0}")]
    Rpc(String),
}

/// Witness service: attests to spend events and verifies attestations.
///
/// Timestamps in attestations are milliseconds since the UNIX epoch on the
/// witness clock, which is distinct from the local clock used for pruning.
#[async_trait]
pub trait Witness: Send + Sync {
    /// Produce a signed attestation over `(nullifier, commitment)`.
    async fn attest(
        &self,
        nullifier: &Nullifier,
        commitment: &Commitment,
    ) -> Result<Attestation, WitnessError>;

    /// Check every signature in the attestation. `Ok(false)` means the
    /// proof is invalid; `Err` means the check itself could not run.
    async fn verify(&self, proof: &Attestation) -> Result<bool, WitnessError>;
}

/// Token issuer: evaluates the VOPRF on blinded elements and vouches for
/// ownership proofs bound to nullifiers.
#[async_trait]
pub trait Issuer: Send + Sync {
    /// Evaluate the issuer key on a 33-byte blinded element, returning the
    /// 130-byte token `A || B || c || s`.
    async fn issue_token(&self, blinded: &[u8], context: &[u8]) -> Result<Vec<u8>, IssuerError>;

    /// Issuer public key, base64url (unpadded) over the SEC1 compressed point.
    fn public_key(&self) -> String;

    /// Verify an opaque ownership proof for a nullifier.
    async fn verify_ownership_proof(
        &self,
        proof: &[u8],
        nullifier: &Nullifier,
    ) -> Result<bool, IssuerError>;
}

/// Decode the issuer public key exchanged as base64url.
pub fn decode_issuer_key(encoded: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(encoded)
        .ok()
}
