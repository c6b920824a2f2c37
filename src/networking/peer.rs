// Copyright (c) 2026 Nullmesh
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Transport seam.
//!
//! The gossip engine treats the transport as "send framed bytes to peer X".
//! Real connections (WebSocket, WebRTC, ...) implement [`Peer`] outside this
//! crate; [`ChannelPeer`] is the in-process implementation used by the demo
//! binary and the integration tests.

use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Peer is no longer connected.
    #[error("peer disconnected")]
    Disconnected,
    /// Outbound queue is gone or full beyond recovery.
    #[error("send failed")]
    Send,
}

/// One connected remote peer, as seen by the gossip engine.
#[async_trait]
pub trait Peer: Send + Sync {
    /// Stable identifier of the remote peer.
    fn id(&self) -> &str;

    /// Remote network address, when the transport knows it. Feeds subnet
    /// diversity tracking.
    fn remote_address(&self) -> Option<&str>;

    /// Liveness as reported by the transport.
    fn is_connected(&self) -> bool;

    /// Deliver one encoded frame. Errors are per-peer and never fatal to a
    /// broadcast.
    async fn send(&self, frame: &[u8]) -> Result<(), TransportError>;

    /// Tear the connection down (reputation enforcement).
    fn disconnect(&self);
}

/// In-process peer backed by a bounded byte channel.
pub struct ChannelPeer {
    id: String,
    remote_address: Option<String>,
    connected: AtomicBool,
    tx: mpsc::Sender<Vec<u8>>,
}

impl ChannelPeer {
    /// Create a peer handle plus the receiver carrying frames sent to it.
    pub fn new(
        id: impl Into<String>,
        remote_address: Option<String>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Arc::new(Self {
                id: id.into(),
                remote_address,
                connected: AtomicBool::new(true),
                tx,
            }),
            rx,
        )
    }
}

#[async_trait]
impl Peer for ChannelPeer {
    fn id(&self) -> &str {
        &self.id
    }

    fn remote_address(&self) -> Option<&str> {
        self.remote_address.as_deref()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        self.tx
            .send(frame.to_vec())
            .await
            .map_err(|_| TransportError::Send)
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }
}
