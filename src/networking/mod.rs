#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Networking: transport seam, wire codec, gossip engine and its state.

pub mod gossip;
pub mod peer;
pub mod reputation;
pub mod store;
pub mod wire;
