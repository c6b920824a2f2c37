// Copyright (c) 2026 Nullmesh
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Transfer validation scenarios: small-mesh rejection, large-network
//! acceptance, double-spend detection, end-to-end mesh flow.

use std::sync::Arc;
use std::time::Duration;

use nullmesh::clients::issuer::LocalIssuer;
use nullmesh::clients::witness::WitnessPool;
use nullmesh::clients::{Issuer, Witness};
use nullmesh::core::token::TokenService;
use nullmesh::core::types::{now_ms, Commitment, Nullifier};
use nullmesh::core::validate::validator::{
    TransferValidator, ValidationMode, ValidationReason, ValidatorConfig,
};
use nullmesh::monitoring::metrics::Metrics;
use nullmesh::networking::gossip::{GossipConfig, GossipEngine, GossipError, InboundFrame};
use nullmesh::networking::peer::ChannelPeer;
use nullmesh::networking::wire::GossipMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn new_engine(witness: Arc<WitnessPool>) -> Arc<GossipEngine> {
    GossipEngine::new(
        GossipConfig::default(),
        witness,
        None,
        Arc::new(Metrics::new().unwrap()),
    )
    .unwrap()
}

/// Register `n` stub peers; receivers are kept alive by the caller so
/// broadcasts to them succeed.
async fn add_stub_peers(
    engine: &Arc<GossipEngine>,
    n: usize,
) -> Vec<(Arc<ChannelPeer>, mpsc::Receiver<Vec<u8>>)> {
    let mut peers = Vec::with_capacity(n);
    for i in 0..n {
        // Distinct /24s so subnet tracking stays quiet.
        let addr = format!("10.{}.{}.1:7000", i / 250, i % 250);
        let (peer, rx) = ChannelPeer::new(format!("peer{i}"), Some(addr), 16);
        engine.add_peer(peer.clone()).await;
        peers.push((peer, rx));
    }
    peers
}

fn nullifier_msg(n: Nullifier, proof: &nullmesh::core::types::Attestation) -> GossipMessage {
    GossipMessage::Nullifier {
        nullifier: n,
        proof: proof.clone(),
        timestamp: now_ms(),
        ownership_proof: None,
    }
}

#[tokio::test(start_paused = true)]
async fn s1_five_peers_fall_short_of_the_standard_bar() {
    let witness = Arc::new(WitnessPool::generate(3).unwrap());
    let engine = new_engine(witness.clone());
    let _guards = add_stub_peers(&engine, 5).await;

    let n = Nullifier::from_bytes([0x11; 32]);
    let c = Commitment::from_bytes([0x22; 32]);
    let proof = witness.attest(&n, &c).await.unwrap();

    let validator = Arc::new(TransferValidator::new(
        engine.clone(),
        witness.clone(),
        ValidatorConfig::default(),
    ));

    let cancel = CancellationToken::new();
    let handle = {
        let validator = validator.clone();
        let proof = proof.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            validator
                .validate(&n, &proof, ValidationMode::Standard, &cancel)
                .await
        })
    };

    // Let the validator clear its pre-wait sample and start sleeping.
    tokio::time::sleep(Duration::from_millis(1)).await;

    // Five peers each report the nullifier once during the wait.
    for i in 0..5 {
        engine
            .on_receive(nullifier_msg(n, &proof), Some(&format!("peer{i}")))
            .await;
    }
    assert_eq!(engine.record(&n).await.unwrap().peer_count, 5);

    let outcome = handle.await.unwrap();
    // min(5/100, .5) + min(3/3, .3) + min(5000/10000, .2) = 0.45 < 0.7.
    assert!(!outcome.valid);
    assert!((outcome.confidence - 0.45).abs() < 1e-9, "{}", outcome.confidence);
    assert_eq!(outcome.reason, ValidationReason::BelowThreshold);
    engine.destroy();
}

#[tokio::test(start_paused = true)]
async fn s2_two_hundred_peers_clear_the_standard_bar() {
    let witness = Arc::new(WitnessPool::generate(3).unwrap());
    let engine = new_engine(witness.clone());
    let _guards = add_stub_peers(&engine, 200).await;

    let n = Nullifier::from_bytes([0x33; 32]);
    let c = Commitment::from_bytes([0x44; 32]);
    let proof = witness.attest(&n, &c).await.unwrap();

    let validator = Arc::new(TransferValidator::new(
        engine.clone(),
        witness.clone(),
        ValidatorConfig::default(),
    ));

    let cancel = CancellationToken::new();
    let handle = {
        let validator = validator.clone();
        let proof = proof.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            validator
                .validate(&n, &proof, ValidationMode::Standard, &cancel)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;

    for i in 0..200 {
        engine
            .on_receive(nullifier_msg(n, &proof), Some(&format!("peer{i}")))
            .await;
    }

    let outcome = handle.await.unwrap();
    // Peer component saturates: 0.5 + 0.3 + 0.1 = 0.9 >= 0.7.
    assert!(outcome.valid);
    assert!((outcome.confidence - 0.9).abs() < 1e-9, "{}", outcome.confidence);
    assert_eq!(outcome.reason, ValidationReason::Accepted);
    engine.destroy();
}

#[tokio::test(start_paused = true)]
async fn s3_double_spend_is_flagged_and_republish_fails() {
    let witness = Arc::new(WitnessPool::generate(3).unwrap());
    let engine = new_engine(witness.clone());
    let _guards = add_stub_peers(&engine, 3).await;

    let n = Nullifier::from_bytes([0x55; 32]);
    let c = Commitment::from_bytes([0x66; 32]);
    let proof = witness.attest(&n, &c).await.unwrap();

    // The first spend already swept the mesh before this validator ran.
    for i in 0..3 {
        engine
            .on_receive(nullifier_msg(n, &proof), Some(&format!("peer{i}")))
            .await;
    }
    assert_eq!(engine.record(&n).await.unwrap().peer_count, 3);

    // A forged second package reusing n: the pre-wait sample spikes.
    let validator = TransferValidator::new(
        engine.clone(),
        witness.clone(),
        ValidatorConfig::default(),
    );
    let cancel = CancellationToken::new();
    let outcome = validator
        .validate(&n, &proof, ValidationMode::Standard, &cancel)
        .await;
    assert!(!outcome.valid);
    assert_eq!(outcome.reason, ValidationReason::DoubleSpendSuspected);

    // Re-publishing the same nullifier locally is refused outright.
    assert!(matches!(
        engine.publish(n, proof).await,
        Err(GossipError::DoubleSpendLocal(_))
    ));
    engine.destroy();
}

#[tokio::test(start_paused = true)]
async fn deep_mode_demands_witness_depth() {
    let witness = Arc::new(WitnessPool::generate(3).unwrap());
    let engine = new_engine(witness.clone());

    let n = Nullifier::from_bytes([0x77; 32]);
    let c = Commitment::from_bytes([0x78; 32]);
    let proof = witness.attest(&n, &c).await.unwrap();
    assert_eq!(proof.witness_depth(), 3);

    let validator = TransferValidator::new(
        engine.clone(),
        witness.clone(),
        ValidatorConfig::default(),
    );
    let cancel = CancellationToken::new();
    let outcome = validator
        .validate(&n, &proof, ValidationMode::Deep, &cancel)
        .await;
    assert!(!outcome.valid);
    assert_eq!(outcome.reason, ValidationReason::InsufficientWitnessDepth);
    engine.destroy();
}

#[tokio::test(start_paused = true)]
async fn cancelled_wait_reports_cancelled() {
    let witness = Arc::new(WitnessPool::generate(1).unwrap());
    let engine = new_engine(witness.clone());

    let n = Nullifier::from_bytes([0x79; 32]);
    let c = Commitment::from_bytes([0x7a; 32]);
    let proof = witness.attest(&n, &c).await.unwrap();

    let validator = Arc::new(TransferValidator::new(
        engine.clone(),
        witness.clone(),
        ValidatorConfig::default(),
    ));
    let cancel = CancellationToken::new();
    let handle = {
        let validator = validator.clone();
        let proof = proof.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            validator
                .validate(&n, &proof, ValidationMode::Standard, &cancel)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;
    cancel.cancel();

    let outcome = handle.await.unwrap();
    assert!(!outcome.valid);
    assert_eq!(outcome.reason, ValidationReason::Cancelled);
    engine.destroy();
}

/// Wire one direction of an in-process link: frames sent to `rx` land on
/// `engine`'s inbound channel attributed to `from`.
fn pump(engine: &Arc<GossipEngine>, mut rx: mpsc::Receiver<Vec<u8>>, from: &str) {
    let inbound = engine.inbound_sender();
    let from = from.to_string();
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if inbound
                .send(InboundFrame {
                    from: Some(from.clone()),
                    frame,
                })
                .await
                .is_err()
            {
                break;
            }
        }
    });
}

#[tokio::test]
async fn end_to_end_mesh_transfer() {
    let issuer = Arc::new(LocalIssuer::generate());
    let witness = Arc::new(WitnessPool::generate(3).unwrap());
    let engine_a = GossipEngine::new(
        GossipConfig::default(),
        witness.clone(),
        Some(issuer.clone() as Arc<dyn Issuer>),
        Arc::new(Metrics::new().unwrap()),
    )
    .unwrap();
    let engine_b = GossipEngine::new(
        GossipConfig::default(),
        witness.clone(),
        Some(issuer.clone() as Arc<dyn Issuer>),
        Arc::new(Metrics::new().unwrap()),
    )
    .unwrap();

    // a <-> b over channel peers.
    let (peer_b, rx_b) = ChannelPeer::new("node-b", Some("127.0.0.2:9000".into()), 64);
    let (peer_a, rx_a) = ChannelPeer::new("node-a", Some("127.0.0.1:9000".into()), 64);
    pump(&engine_b, rx_b, "node-a");
    pump(&engine_a, rx_a, "node-b");
    engine_a.add_peer(peer_b).await;
    engine_b.add_peer(peer_a).await;

    let spender = TokenService::new(
        issuer.clone(),
        witness.clone(),
        engine_a.clone(),
        &b"mesh-test"[..],
    );
    let recipient = TokenService::new(
        issuer.clone(),
        witness.clone(),
        engine_b.clone(),
        &b"mesh-test"[..],
    );

    let mut token = spender.mint(100).await.unwrap();
    let pkg = spender.transfer(&mut token, b"recipient-pk", None).await.unwrap();

    // Let the frame cross the link and clear admission on b.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let record = engine_b.record(&pkg.nullifier).await.expect("propagated");
    assert!(record.peer_count >= 1);

    // Fast validation on the recipient node; the bar is sized for a
    // two-node mesh (1 reporter + depth 3 => ~0.31).
    let validator = TransferValidator::new(
        engine_b.clone(),
        witness.clone(),
        ValidatorConfig {
            min_confidence: 0.6,
            ..ValidatorConfig::default()
        },
    );
    let cancel = CancellationToken::new();
    let outcome = validator
        .validate(&pkg.nullifier, &pkg.proof, ValidationMode::Fast, &cancel)
        .await;
    assert!(outcome.valid, "confidence {}", outcome.confidence);

    let received = recipient.receive(&pkg, &[5u8; 32], 100).await.unwrap();
    assert_eq!(received.amount(), 100);

    // The spender's second use of the token dies locally.
    assert!(spender.transfer(&mut token, b"someone-else", None).await.is_err());

    engine_a.destroy();
    engine_b.destroy();
}
