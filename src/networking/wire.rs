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

//! Gossip wire messages and framing.
//!
//! Messages are a tagged sum so the admission shape check collapses into the
//! decoder. Frames carry a 1-byte flags header: bit 0 marks a
//! deflate-compressed payload (applied when the raw payload exceeds
//! [`COMPRESS_THRESHOLD`]), bit 1 is reserved for end-to-end encryption and
//! rejected for now. The payload itself is canonical bincode.

use crate::core::types::{
    decode_canonical_limited, encode_canonical, Attestation, Nullifier,
};
use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use thiserror::Error;

/// Frame flag: payload is deflate compressed.
pub const FLAG_COMPRESSED: u8 = 0b0000_0001;
/// Frame flag: reserved for end-to-end encryption.
pub const FLAG_ENCRYPTED: u8 = 0b0000_0010;
const KNOWN_FLAGS: u8 = FLAG_COMPRESSED | FLAG_ENCRYPTED;

/// Compress payloads larger than this many bytes.
pub const COMPRESS_THRESHOLD: usize = 1024;
/// Hard cap on a decoded payload; anything larger is hostile.
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;

/// Wire codec errors.
#[derive(Debug, Error)]
pub enum WireError {
    /// Frame too short or payload not decodable as a known message.
    #[error("malformed frame")]
    Malformed,
    /// Flags byte carries bits this node cannot honor.
    #[error("unsupported frame flags")]
    UnsupportedFlags,
    /// Payload exceeds the size cap (raw or after decompression).
    #[error("frame too large")]
    TooLarge,
}

/// Messages propagated through the gossip layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum GossipMessage {
    /// A spend event: nullifier plus its witness proof.
    Nullifier {
        /// The spend tag.
        nullifier: Nullifier,
        /// Witness attestation over the spend.
        proof: Attestation,
        /// Sender wall clock at send time (ms since UNIX epoch).
        timestamp: u64,
        /// Issuer-bound ownership proof, required by some meshes.
        ownership_proof: Option<Vec<u8>>,
    },
}

/// Encode a message into a flagged frame.
pub fn encode_frame(msg: &GossipMessage) -> Result<Vec<u8>, WireError> {
    let payload = encode_canonical(msg).map_err(|_| WireError::Malformed)?;
    if payload.len() > MAX_PAYLOAD_BYTES {
        return Err(WireError::TooLarge);
    }

    if payload.len() > COMPRESS_THRESHOLD {
        let mut enc = DeflateEncoder::new(
            Vec::with_capacity(payload.len() / 2 + 1),
            Compression::default(),
        );
        enc.write_all(&payload).map_err(|_| WireError::Malformed)?;
        let compressed = enc.finish().map_err(|_| WireError::Malformed)?;

        let mut out = Vec::with_capacity(1 + compressed.len());
        out.push(FLAG_COMPRESSED);
        out.extend_from_slice(&compressed);
        return Ok(out);
    }

    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(0);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a flagged frame back into a message.
pub fn decode_frame(frame: &[u8]) -> Result<GossipMessage, WireError> {
    let (&flags, body) = frame.split_first().ok_or(WireError::Malformed)?;
    if flags & !KNOWN_FLAGS != 0 || flags & FLAG_ENCRYPTED != 0 {
        return Err(WireError::UnsupportedFlags);
    }

    if flags & FLAG_COMPRESSED != 0 {
        let mut payload = Vec::new();
        let mut dec = DeflateDecoder::new(body).take(MAX_PAYLOAD_BYTES as u64 + 1);
        dec.read_to_end(&mut payload).map_err(|_| WireError::Malformed)?;
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(WireError::TooLarge);
        }
        return decode_canonical_limited(&payload, MAX_PAYLOAD_BYTES)
            .map_err(|_| WireError::Malformed);
    }

    decode_canonical_limited(body, MAX_PAYLOAD_BYTES).map_err(|_| WireError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(sig_bytes: usize) -> GossipMessage {
        GossipMessage::Nullifier {
            nullifier: Nullifier::from_bytes([1u8; 32]),
            proof: Attestation {
                timestamp: 1_700_000_000_000,
                witness_ids: vec!["w".into()],
                signatures: vec![vec![0xab; sig_bytes]],
                hash: [2u8; 32],
            },
            timestamp: 1_700_000_000_001,
            ownership_proof: None,
        }
    }

    #[test]
    fn small_frames_stay_uncompressed() {
        let msg = message(64);
        let frame = encode_frame(&msg).unwrap();
        assert_eq!(frame[0], 0);
        let back = decode_frame(&frame).unwrap();
        let GossipMessage::Nullifier { nullifier, .. } = back;
        assert_eq!(nullifier, Nullifier::from_bytes([1u8; 32]));
    }

    #[test]
    fn large_frames_set_the_compression_bit() {
        let msg = message(4096);
        let frame = encode_frame(&msg).unwrap();
        assert_eq!(frame[0] & FLAG_COMPRESSED, FLAG_COMPRESSED);
        // Constant filler compresses well below the raw payload size.
        assert!(frame.len() < 4096);
        let GossipMessage::Nullifier { proof, .. } = decode_frame(&frame).unwrap();
        assert_eq!(proof.signatures[0].len(), 4096);
    }

    #[test]
    fn unknown_and_reserved_flags_are_rejected() {
        let mut frame = encode_frame(&message(16)).unwrap();
        frame[0] = FLAG_ENCRYPTED;
        assert!(matches!(
            decode_frame(&frame),
            Err(WireError::UnsupportedFlags)
        ));
        frame[0] = 0b1000_0000;
        assert!(matches!(
            decode_frame(&frame),
            Err(WireError::UnsupportedFlags)
        ));
    }

    #[test]
    fn truncated_frames_are_malformed() {
        assert!(matches!(decode_frame(&[]), Err(WireError::Malformed)));
        let frame = encode_frame(&message(16)).unwrap();
        assert!(matches!(
            decode_frame(&frame[..frame.len() / 2]),
            Err(WireError::Malformed)
        ));
    }
}
