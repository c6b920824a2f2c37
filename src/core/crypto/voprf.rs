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

//! VOPRF client: blinding and token finalization with DLEQ verification.
//!
//! The issuer evaluates its key on a blinded curve point and returns a
//! 130-byte token `A || B || c || s` (two compressed points, two big-endian
//! scalars). `finalize` verifies the Chaum-Pedersen discrete-log-equality
//! proof `(c, s)` that the evaluation `B = A * k` used the same key `k` as
//! the issuer's published public key `Y = G * k`, Fiat-Shamir transformed
//! over a fixed transcript.
//!
//! ## Transcript (wire contract)
//!
//! ```text
//! u32be(len(DST)) || DST || G || Y || A || B || T1 || T2
//! ```
//!
//! with `DST = "DLEQ-P256-v1" || context` and all six points SEC1
//! compressed. The order and the length prefix are part of the interop
//! surface; any deviation breaks verification against remote issuers.

use crate::core::crypto::curve::{
    self, CurveError, POINT_LEN, SCALAR_LEN,
};
use p256::{ProjectivePoint, Scalar};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroize;

/// DLEQ domain-separation prefix; the caller's context bytes follow it.
pub const DLEQ_DST_PREFIX: &[u8] = b"DLEQ-P256-v1";

/// Issued token length: A(33) || B(33) || c(32) || s(32).
pub const TOKEN_LEN: usize = 2 * POINT_LEN + 2 * SCALAR_LEN;

/// VOPRF client errors.
#[derive(Debug, Error)]
pub enum VoprfError {
    /// Token is not exactly 130 bytes.
    #[error("invalid token length")]
    InvalidTokenLength,
    /// DLEQ proof did not verify (includes malformed points/scalars and a
    /// blinded element that does not match the local blinding state).
    #[error("invalid dleq proof")]
    InvalidDleqProof,
    /// Issuer public key bytes do not decode to a curve point.
    #[error("invalid issuer public key")]
    InvalidIssuerKey,
    /// Input could not be mapped to the curve.
    #[error("hash-to-curve")]
    HashToCurve,
}

/// Client-side blinding state. Retains the blinding scalar and the mapped
/// input point between `blind` and `finalize`; the scalar is wiped on drop.
pub struct BlindState {
    r: Scalar,
    point: ProjectivePoint,
    blinded: ProjectivePoint,
}

impl BlindState {
    /// The point the input hashed to (before blinding).
    pub fn input_point(&self) -> &ProjectivePoint {
        &self.point
    }
}

impl Drop for BlindState {
    fn drop(&mut self) {
        self.r.zeroize();
    }
}

/// Map `input` to the curve and blind it with a fresh uniform scalar.
///
/// Returns the 33-byte blinded element to send to the issuer plus the state
/// needed by `finalize`.
pub fn blind(input: &[u8], context: &[u8]) -> Result<([u8; POINT_LEN], BlindState), VoprfError> {
    let point = curve::hash_to_curve(input, context).map_err(|_| VoprfError::HashToCurve)?;
    let r = curve::random_scalar();
    let blinded = point * *r;
    let encoded = curve::encode_point(&blinded).map_err(|_| VoprfError::HashToCurve)?;
    Ok((
        encoded,
        BlindState {
            r: *r,
            point,
            blinded,
        },
    ))
}

/// Verify a 130-byte issued token against the issuer public key and return
/// it as the bearer credential.
pub fn finalize(
    state: &BlindState,
    token: &[u8],
    issuer_pubkey: &[u8],
    context: &[u8],
) -> Result<Vec<u8>, VoprfError> {
    if token.len() != TOKEN_LEN {
        return Err(VoprfError::InvalidTokenLength);
    }

    let y = curve::decode_point(issuer_pubkey).map_err(|_| VoprfError::InvalidIssuerKey)?;

    let (a_bytes, rest) = token.split_at(POINT_LEN);
    let (b_bytes, rest) = rest.split_at(POINT_LEN);
    let (c_bytes, s_bytes) = rest.split_at(SCALAR_LEN);

    let a = curve::decode_point(a_bytes).map_err(|_| VoprfError::InvalidDleqProof)?;
    let b = curve::decode_point(b_bytes).map_err(|_| VoprfError::InvalidDleqProof)?;
    let c = curve::decode_scalar(c_bytes).map_err(|_| VoprfError::InvalidDleqProof)?;
    let s = curve::decode_scalar(s_bytes).map_err(|_| VoprfError::InvalidDleqProof)?;

    // The issuer must have evaluated the element we actually sent.
    if a != state.blinded {
        return Err(VoprfError::InvalidDleqProof);
    }

    if !verify_dleq(&y, &a, &b, &c, &s, context)? {
        return Err(VoprfError::InvalidDleqProof);
    }

    Ok(token.to_vec())
}

/// Chaum-Pedersen verification: recompute the commitments from `(c, s)` and
/// compare the Fiat-Shamir challenge in constant time.
pub fn verify_dleq(
    y: &ProjectivePoint,
    a: &ProjectivePoint,
    b: &ProjectivePoint,
    c: &Scalar,
    s: &Scalar,
    context: &[u8],
) -> Result<bool, VoprfError> {
    let g = curve::generator();
    let t1 = g * *s - *y * *c;
    let t2 = *a * *s - *b * *c;

    let c_prime = dleq_challenge(y, a, b, &t1, &t2, context)
        .map_err(|_| VoprfError::InvalidDleqProof)?;

    Ok(c.ct_eq(&c_prime).into())
}

/// Fiat-Shamir challenge over the fixed DLEQ transcript, reduced mod n.
///
/// Shared by the verifier here and the in-process issuer's prover so the two
/// sides can never drift apart byte-wise.
pub fn dleq_challenge(
    y: &ProjectivePoint,
    a: &ProjectivePoint,
    b: &ProjectivePoint,
    t1: &ProjectivePoint,
    t2: &ProjectivePoint,
    context: &[u8],
) -> Result<Scalar, CurveError> {
    let mut dst = Vec::with_capacity(DLEQ_DST_PREFIX.len() + context.len());
    dst.extend_from_slice(DLEQ_DST_PREFIX);
    dst.extend_from_slice(context);

    let mut h = Sha256::new();
    h.update((dst.len() as u32).to_be_bytes());
    h.update(&dst);
    h.update(curve::encode_point(&curve::generator())?);
    h.update(curve::encode_point(y)?);
    h.update(curve::encode_point(a)?);
    h.update(curve::encode_point(b)?);
    h.update(curve::encode_point(t1)?);
    h.update(curve::encode_point(t2)?);

    let digest: [u8; 32] = h.finalize().into();
    Ok(curve::reduce_digest(&digest))
}
