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

//! Transfer validator: decide whether a received transfer is safe to
//! accept, from gossip propagation, witness depth, and wait time.
//!
//! First-seen wins at the granularity of this node's network view: a
//! legitimate spend propagates and pins its record before a forged reuse of
//! the same nullifier can take hold. A record that already carries more
//! than one reporter before our own wait even starts is the signature of a
//! concurrent double-spend and is rejected outright.
//!
//! Rejection is an outcome, not an error; the validator never throws for a
//! failed transfer.

use crate::clients::Witness;
use crate::core::types::{Attestation, Nullifier};
use crate::core::validate::confidence::{ConfidenceEvidence, ConfidenceWeights};
use crate::networking::gossip::GossipEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Minimum witness depth demanded by deep validation.
pub const DEEP_WITNESS_DEPTH: usize = 5;

/// Validation effort levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationMode {
    /// No wait, half the confidence bar. For low-value transfers.
    Fast,
    /// Wait `wait` to accumulate propagation, full bar.
    Standard,
    /// Wait `deep_wait`, full bar, and demand deep witness coverage.
    Deep,
}

/// Why the validator decided the way it did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationReason {
    /// Confidence met the bar.
    Accepted,
    /// Confidence stayed below the bar after the wait.
    BelowThreshold,
    /// Multiple reporters existed before our wait began.
    DoubleSpendSuspected,
    /// Deep mode demanded more witness signatures than the proof carries.
    InsufficientWitnessDepth,
    /// Attestation failed witness verification.
    InvalidAttestation,
    /// The wait was cancelled.
    Cancelled,
}

/// Validator verdict.
#[derive(Clone, Copy, Debug)]
pub struct ValidationOutcome {
    /// Accept the transfer?
    pub valid: bool,
    /// Combined confidence in [0, 1].
    pub confidence: f64,
    /// Deciding rule.
    pub reason: ValidationReason,
}

impl ValidationOutcome {
    fn rejected(confidence: f64, reason: ValidationReason) -> Self {
        Self {
            valid: false,
            confidence,
            reason,
        }
    }
}

/// Validator configuration.
#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// Standard-mode wait.
    pub wait: Duration,
    /// Deep-mode wait.
    pub deep_wait: Duration,
    /// Confidence bar for standard/deep (fast uses half).
    pub min_confidence: f64,
    /// Reporters tolerated before our own wait starts; more means a
    /// concurrent spend already propagated.
    pub max_pre_wait_reports: u32,
    /// Scoring weights.
    pub weights: ConfidenceWeights,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            wait: Duration::from_millis(5_000),
            deep_wait: Duration::from_millis(15_000),
            min_confidence: 0.7,
            max_pre_wait_reports: 1,
            weights: ConfidenceWeights::default(),
        }
    }
}

/// Confidence-scoring admission state machine for received transfers.
///
/// Holds non-owning references to the gossip engine and the witness
/// collaborator.
pub struct TransferValidator {
    gossip: Arc<GossipEngine>,
    witness: Arc<dyn Witness>,
    cfg: ValidatorConfig,
}

impl TransferValidator {
    /// Build a validator over an engine and a witness client.
    pub fn new(
        gossip: Arc<GossipEngine>,
        witness: Arc<dyn Witness>,
        cfg: ValidatorConfig,
    ) -> Self {
        Self {
            gossip,
            witness,
            cfg,
        }
    }

    /// Validate a nullifier and its attestation at the given effort level.
    ///
    /// The wait is a pure sleep and honors `cancel`; a cancelled run
    /// reports `Cancelled`, never a partial acceptance.
    pub async fn validate(
        &self,
        nullifier: &Nullifier,
        proof: &Attestation,
        mode: ValidationMode,
        cancel: &CancellationToken,
    ) -> ValidationOutcome {
        let witness_depth = proof.witness_depth();

        match self.witness.verify(proof).await {
            Ok(true) => {}
            Ok(false) => {
                return ValidationOutcome::rejected(0.0, ValidationReason::InvalidAttestation)
            }
            Err(err) => {
                warn!(?err, "witness verify failed during validation");
                return ValidationOutcome::rejected(0.0, ValidationReason::InvalidAttestation);
            }
        }

        if mode == ValidationMode::Deep && witness_depth < DEEP_WITNESS_DEPTH {
            return ValidationOutcome::rejected(0.0, ValidationReason::InsufficientWitnessDepth);
        }

        let wait = match mode {
            ValidationMode::Fast => Duration::ZERO,
            ValidationMode::Standard => self.cfg.wait,
            ValidationMode::Deep => self.cfg.deep_wait,
        };

        // Pre-wait sample: a record already reported by several peers
        // before we even started waiting means the spend raced ahead of us
        // somewhere else in the mesh.
        if mode != ValidationMode::Fast {
            let early_reports = self.reporters(nullifier).await;
            if early_reports > f64::from(self.cfg.max_pre_wait_reports) {
                debug!(nullifier = %nullifier, early_reports, "pre-wait peer-count spike");
                let confidence = self.cfg.weights.score(&ConfidenceEvidence {
                    gossip_peers: early_reports,
                    witness_depth,
                    waited: Duration::ZERO,
                });
                return ValidationOutcome::rejected(
                    confidence,
                    ValidationReason::DoubleSpendSuspected,
                );
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return ValidationOutcome::rejected(0.0, ValidationReason::Cancelled);
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        let reporters = self.reporters(nullifier).await;
        let confidence = self.cfg.weights.score(&ConfidenceEvidence {
            gossip_peers: reporters,
            witness_depth,
            waited: wait,
        });

        let bar = match mode {
            ValidationMode::Fast => self.cfg.min_confidence * 0.5,
            ValidationMode::Standard | ValidationMode::Deep => self.cfg.min_confidence,
        };

        if confidence >= bar {
            ValidationOutcome {
                valid: true,
                confidence,
                reason: ValidationReason::Accepted,
            }
        } else {
            ValidationOutcome::rejected(confidence, ValidationReason::BelowThreshold)
        }
    }

    /// Absolute reporter count, recovered from the engine's live-peer
    /// fraction.
    async fn reporters(&self, nullifier: &Nullifier) -> f64 {
        let fraction = self.gossip.check_nullifier(nullifier).await;
        let total = self.gossip.peer_count().await;
        (fraction * total.max(1) as f64).round()
    }
}
