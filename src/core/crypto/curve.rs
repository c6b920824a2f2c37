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

//! P-256 primitives: scalars, points, SEC1 encoding, RFC 9380 hash-to-curve.
//!
//! All arithmetic is delegated to the RustCrypto `p256` crate; this module
//! only fixes the encodings and the domain-separation rules the rest of the
//! crate relies on:
//! - points travel as 33-byte SEC1 compressed encodings,
//! - scalars travel as canonical 32-byte big-endian encodings,
//! - `hash_to_curve` runs the `P256_XMD:SHA-256_SSWU_RO_` suite with the
//!   suite name as the DST prefix, followed by the caller's context bytes.

use p256::{
    elliptic_curve::{
        hash2curve::{ExpandMsgXmd, GroupDigest},
        ops::Reduce,
        sec1::{FromEncodedPoint, ToEncodedPoint},
        PrimeField,
    },
    AffinePoint, EncodedPoint, FieldBytes, NistP256, NonZeroScalar, ProjectivePoint, Scalar,
};
use rand_core::OsRng;
use sha2::Sha256;
use thiserror::Error;

/// SEC1 compressed point length.
pub const POINT_LEN: usize = 33;
/// Big-endian scalar length.
pub const SCALAR_LEN: usize = 32;

/// RFC 9380 suite identifier; callers' context bytes are appended to form the DST.
pub const HASH_TO_CURVE_SUITE: &[u8] = b"P256_XMD:SHA-256_SSWU_RO_";

/// Curve layer errors.
#[derive(Debug, Error)]
pub enum CurveError {
    /// Bytes do not decode to a curve point.
    #[error("invalid point encoding")]
    InvalidPoint,
    /// Bytes are not a canonical scalar below the curve order.
    #[error("invalid scalar encoding")]
    InvalidScalar,
    /// The point at infinity has no 33-byte compressed encoding.
    #[error("point at infinity")]
    Identity,
    /// hash-to-curve expansion failed (oversized DST or output request).
    #[error("hash-to-curve")]
    HashToCurve,
}

/// The fixed group generator.
pub fn generator() -> ProjectivePoint {
    ProjectivePoint::GENERATOR
}

/// Uniform random non-zero scalar from the OS entropy source.
pub fn random_scalar() -> NonZeroScalar {
    NonZeroScalar::random(&mut OsRng)
}

/// SEC1 compressed encoding. Fails on the identity, which compresses to a
/// single byte and would break fixed-width transcripts.
pub fn encode_point(point: &ProjectivePoint) -> Result<[u8; POINT_LEN], CurveError> {
    let encoded = point.to_affine().to_encoded_point(true);
    let bytes = encoded.as_bytes();
    if bytes.len() != POINT_LEN {
        return Err(CurveError::Identity);
    }
    let mut out = [0u8; POINT_LEN];
    out.copy_from_slice(bytes);
    Ok(out)
}

/// Decode a SEC1 compressed point.
pub fn decode_point(bytes: &[u8]) -> Result<ProjectivePoint, CurveError> {
    if bytes.len() != POINT_LEN {
        return Err(CurveError::InvalidPoint);
    }
    let encoded = EncodedPoint::from_bytes(bytes).map_err(|_| CurveError::InvalidPoint)?;
    let affine: Option<AffinePoint> = AffinePoint::from_encoded_point(&encoded).into();
    affine
        .map(ProjectivePoint::from)
        .ok_or(CurveError::InvalidPoint)
}

/// Canonical big-endian scalar encoding.
pub fn encode_scalar(scalar: &Scalar) -> [u8; SCALAR_LEN] {
    scalar.to_repr().into()
}

/// Parse a canonical big-endian scalar; values >= n are rejected, not reduced.
pub fn decode_scalar(bytes: &[u8]) -> Result<Scalar, CurveError> {
    if bytes.len() != SCALAR_LEN {
        return Err(CurveError::InvalidScalar);
    }
    let repr = *FieldBytes::from_slice(bytes);
    Option::<Scalar>::from(Scalar::from_repr(repr)).ok_or(CurveError::InvalidScalar)
}

/// Reduce a 32-byte digest modulo the curve order.
pub fn reduce_digest(digest: &[u8; 32]) -> Scalar {
    // Scalar carries a single Reduce impl (over the curve's 256-bit uint).
    Scalar::reduce_bytes(FieldBytes::from_slice(digest))
}

/// Multiplicative inverse modulo the curve order.
pub fn invert_scalar(scalar: &Scalar) -> Result<Scalar, CurveError> {
    Option::<Scalar>::from(scalar.invert()).ok_or(CurveError::InvalidScalar)
}

/// RFC 9380 `P256_XMD:SHA-256_SSWU_RO_` hash-to-curve.
///
/// The DST is the suite identifier concatenated with `context`; differing
/// contexts therefore produce independent maps over the same input.
pub fn hash_to_curve(input: &[u8], context: &[u8]) -> Result<ProjectivePoint, CurveError> {
    let mut dst = Vec::with_capacity(HASH_TO_CURVE_SUITE.len() + context.len());
    dst.extend_from_slice(HASH_TO_CURVE_SUITE);
    dst.extend_from_slice(context);

    NistP256::hash_from_bytes::<ExpandMsgXmd<Sha256>>(&[input], &[&dst])
        .map_err(|_| CurveError::HashToCurve)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::elliptic_curve::Field;

    #[test]
    fn point_roundtrip() {
        let k = random_scalar();
        let p = generator() * *k;
        let bytes = encode_point(&p).unwrap();
        assert!(bytes[0] == 0x02 || bytes[0] == 0x03);
        let back = decode_point(&bytes).unwrap();
        assert_eq!(encode_point(&back).unwrap(), bytes);
    }

    #[test]
    fn identity_has_no_fixed_width_encoding() {
        assert!(matches!(
            encode_point(&ProjectivePoint::IDENTITY),
            Err(CurveError::Identity)
        ));
    }

    #[test]
    fn scalar_arithmetic_mod_order() {
        let a = *random_scalar();
        let inv = invert_scalar(&a).unwrap();
        assert_eq!(a * inv, Scalar::ONE);

        let b = *random_scalar();
        assert_eq!(a + b - b, a);
    }

    #[test]
    fn decode_scalar_rejects_order() {
        // n itself is non-canonical.
        let n_bytes = hex::decode("ffffffff00000000ffffffffffffffffbce6faada7179e84f3b9cac2fc632551")
            .unwrap();
        assert!(decode_scalar(&n_bytes).is_err());
        // n - 1 is canonical.
        let mut nm1 = n_bytes;
        *nm1.last_mut().unwrap() -= 1;
        assert!(decode_scalar(&nm1).is_ok());
    }

    #[test]
    fn hash_to_curve_is_deterministic() {
        let a = hash_to_curve(b"token-secret", b"ctx-1").unwrap();
        let b = hash_to_curve(b"token-secret", b"ctx-1").unwrap();
        assert_eq!(encode_point(&a).unwrap(), encode_point(&b).unwrap());
    }

    #[test]
    fn hash_to_curve_separates_context_and_input() {
        let a = hash_to_curve(b"token-secret", b"ctx-1").unwrap();
        let b = hash_to_curve(b"token-secret", b"ctx-2").unwrap();
        let c = hash_to_curve(b"other-secret", b"ctx-1").unwrap();
        assert_ne!(encode_point(&a).unwrap(), encode_point(&b).unwrap());
        assert_ne!(encode_point(&a).unwrap(), encode_point(&c).unwrap());
    }
}
