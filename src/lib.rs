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

//! Nullmesh - peer-to-peer double-spend prevention for anonymous tokens.
//!
//! This crate provides:
//! - P-256 primitives and a VOPRF client (RFC 9380 hash-to-curve, DLEQ
//!   proof verification) producing unforgeable bearer tokens
//! - A nullifier gossip engine: epidemic broadcast with peer scoring,
//!   timestamp windows, witness-proof verification, optional
//!   ownership-proof binding, subnet diversity tracking, and a bounded
//!   record store with background pruning
//! - A confidence-scoring transfer validator fusing gossip propagation,
//!   witness depth, and elapsed-wait evidence
//! - The token lifecycle (mint, transfer, receive) tying the three together
//!
//! The transport is an external collaborator behind the
//! [`networking::peer::Peer`] trait; issuer and witness services sit behind
//! the traits in [`clients`]. There is no chain and no total order: the
//! design chooses probabilistic fast finality over consensus.

/// Issuer and witness collaborator interfaces and in-process impls.
pub mod clients;
/// Core protocol (types, crypto, token lifecycle, validation).
pub mod core;
/// Observability (metrics, structured logging helpers).
pub mod monitoring;
/// Gossip networking (transport seam, wire codec, engine, scoring).
pub mod networking;
