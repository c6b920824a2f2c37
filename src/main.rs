#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Nullmesh demo node: an in-memory three-node mesh performing one full
//! mint -> transfer -> validate -> receive round, then shutting down.

use std::sync::Arc;

use nullmesh::clients::issuer::LocalIssuer;
use nullmesh::clients::witness::WitnessPool;
use nullmesh::clients::Issuer;
use nullmesh::core::crypto::curve;
use nullmesh::core::token::TokenService;
use nullmesh::core::validate::validator::{
    TransferValidator, ValidationMode, ValidatorConfig,
};
use nullmesh::monitoring::metrics::Metrics;
use nullmesh::networking::gossip::{GossipConfig, GossipEngine, InboundFrame};
use nullmesh::networking::peer::ChannelPeer;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env(key, "")
        .parse::<u64>()
        .ok()
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

/// Optional TOML config (`NULLMESH_CONFIG`); env vars override.
#[derive(Debug, Default, Deserialize)]
struct DemoConfig {
    #[serde(default)]
    wait_ms: Option<u64>,
    #[serde(default)]
    min_confidence: Option<f64>,
}

fn load_config() -> DemoConfig {
    let Ok(path) = std::env::var("NULLMESH_CONFIG") else {
        return DemoConfig::default();
    };
    match std::fs::read_to_string(&path).map(|raw| toml::from_str::<DemoConfig>(&raw)) {
        Ok(Ok(cfg)) => cfg,
        Ok(Err(e)) => {
            warn!(%path, err = %e, "bad config file; using defaults");
            DemoConfig::default()
        }
        Err(e) => {
            warn!(%path, err = %e, "unreadable config file; using defaults");
            DemoConfig::default()
        }
    }
}

/// Connect two engines with a bidirectional in-process link.
async fn link(
    a: &Arc<GossipEngine>,
    a_id: &str,
    a_addr: &str,
    b: &Arc<GossipEngine>,
    b_id: &str,
    b_addr: &str,
) {
    // a's handle for b, and the pump feeding b's inbound channel.
    let (peer_b, mut rx_b) = ChannelPeer::new(b_id, Some(b_addr.to_string()), 256);
    let (peer_a, mut rx_a) = ChannelPeer::new(a_id, Some(a_addr.to_string()), 256);

    let b_inbound = b.inbound_sender();
    let from_a = a_id.to_string();
    tokio::spawn(async move {
        while let Some(frame) = rx_b.recv().await {
            if b_inbound
                .send(InboundFrame {
                    from: Some(from_a.clone()),
                    frame,
                })
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let a_inbound = a.inbound_sender();
    let from_b = b_id.to_string();
    tokio::spawn(async move {
        while let Some(frame) = rx_a.recv().await {
            if a_inbound
                .send(InboundFrame {
                    from: Some(from_b.clone()),
                    frame,
                })
                .await
                .is_err()
            {
                break;
            }
        }
    });

    a.add_peer(peer_b).await;
    b.add_peer(peer_a).await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .compact()
        .try_init();

    let file_cfg = load_config();
    let wait_ms = env_u64("NULLMESH_WAIT_MS", file_cfg.wait_ms.unwrap_or(1_500));
    // Small meshes cannot reach the 0.7 production bar by design (the peer
    // component needs ~100 reporters); the demo uses a bar sized for three
    // nodes.
    let min_confidence = env("NULLMESH_MIN_CONFIDENCE", "")
        .parse::<f64>()
        .ok()
        .or(file_cfg.min_confidence)
        .unwrap_or(0.3);

    let issuer = Arc::new(LocalIssuer::generate());
    let witness = Arc::new(WitnessPool::generate(3)?);
    info!(
        issuer_key = %issuer.public_key(),
        witnesses = witness.depth(),
        "collaborators ready"
    );

    let mut engines = Vec::new();
    for name in ["alpha", "beta", "gamma"] {
        let metrics = Arc::new(Metrics::new()?);
        let engine = GossipEngine::new(
            GossipConfig::default(),
            witness.clone(),
            Some(issuer.clone() as Arc<dyn Issuer>),
            metrics,
        )?;
        info!(node = name, "gossip engine started");
        engines.push((name, engine));
    }

    // Full mesh over loopback-style addresses.
    for i in 0..engines.len() {
        for j in (i + 1)..engines.len() {
            let (a_id, a) = (engines[i].0, engines[i].1.clone());
            let (b_id, b) = (engines[j].0, engines[j].1.clone());
            let a_addr = format!("127.0.0.{}:9000", i + 1);
            let b_addr = format!("127.0.0.{}:9000", j + 1);
            link(&a, a_id, &a_addr, &b, b_id, &b_addr).await;
        }
    }

    let spender = TokenService::new(
        issuer.clone(),
        witness.clone(),
        engines[0].1.clone(),
        &b"nullmesh/demo/v1"[..],
    );
    let recipient_node = TokenService::new(
        issuer.clone(),
        witness.clone(),
        engines[1].1.clone(),
        &b"nullmesh/demo/v1"[..],
    );

    let mut token = spender.mint(100).await?;
    info!(token = token.id(), amount = token.amount(), "minted");

    // Recipient key pair: the spender only ever sees the public half.
    let recipient_scalar = curve::random_scalar();
    let recipient_pk = curve::encode_point(&(curve::generator() * *recipient_scalar))?;
    let recipient_secret: [u8; 32] = curve::encode_scalar(&recipient_scalar);

    let pkg = spender.transfer(&mut token, &recipient_pk, None).await?;
    info!(nullifier = %pkg.nullifier, witnesses = pkg.proof.witness_depth(), "transferred");

    let validator = TransferValidator::new(
        engines[1].1.clone(),
        witness.clone(),
        ValidatorConfig {
            wait: std::time::Duration::from_millis(wait_ms),
            min_confidence,
            // In-process gossip outruns the validator; several reporters
            // before the wait starts is normal here, not a double spend.
            max_pre_wait_reports: 8,
            ..ValidatorConfig::default()
        },
    );

    let cancel = CancellationToken::new();
    let outcome = validator
        .validate(&pkg.nullifier, &pkg.proof, ValidationMode::Standard, &cancel)
        .await;
    info!(
        valid = outcome.valid,
        confidence = format!("{:.3}", outcome.confidence),
        reason = ?outcome.reason,
        "validated"
    );

    if outcome.valid {
        let received = recipient_node.receive(&pkg, &recipient_secret, 100).await?;
        info!(token = received.id(), amount = received.amount(), "received");
    } else {
        warn!("transfer rejected; token not accepted");
    }

    // A second spend of the same token is refused locally.
    if let Err(err) = spender.transfer(&mut token, &recipient_pk, None).await {
        info!(%err, "double spend attempt rejected");
    }

    for (name, engine) in &engines {
        let stats = engine.stats().await;
        info!(
            node = name,
            nullifiers = stats.known_nullifiers,
            peers = stats.connected_peers,
            "final stats"
        );
        engine.destroy();
    }

    Ok(())
}
