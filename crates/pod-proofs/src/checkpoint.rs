//! Checkpoint Lifecycle
//!
//! A checkpoint snapshots every active pod validator's beacon balance at one
//! beacon block so the pod can reconcile shares. Its lifecycle is
//!
//! ```text
//! NoActiveCheckpoint -> Started -> ProofsPending(n) -> ... -> ProofsPending(0) = Completed
//! ```
//!
//! [`CheckpointPhase`] models that state machine; transitions consume the old
//! phase. [`CheckpointProgress`] tracks the pending count while proofs are
//! submitted, batch by batch.
//!
//! Proofs for a checkpoint are only ever built against the snapshot of the
//! block the checkpoint committed to.

use crate::proof::{
    BalanceContainerEntry, BalanceContainerProof, BalanceProof, ProofDocument, ProofError,
};
use crate::snapshot::BeaconStateSnapshot;
use crate::state_prover::StateProver;
use crate::types::{hex_bytes32, PodValidator, ValidatorStatus};
use crate::workers::ProofWorkers;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

const GWEI_PER_ETH: f64 = 1e9;

/// An active checkpoint as recorded by the pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub started_at_timestamp: u64,
    #[serde(with = "hex_bytes32")]
    pub beacon_block_root: [u8; 32],
    pub proofs_remaining: u64,
    pub pod_balance_gwei: u64,
    pub balance_deltas_gwei: i64,
    /// Shares the pod owner will hold once the checkpoint completes
    pub pending_shares_gwei: i128,
}

impl Checkpoint {
    /// `pending_shares_gwei = current_shares_gwei + pod_balance_gwei + balance_deltas_gwei`
    #[must_use]
    pub fn new(
        started_at_timestamp: u64,
        beacon_block_root: [u8; 32],
        proofs_remaining: u64,
        pod_balance_gwei: u64,
        balance_deltas_gwei: i64,
        current_shares_gwei: i128,
    ) -> Self {
        Self {
            started_at_timestamp,
            beacon_block_root,
            proofs_remaining,
            pod_balance_gwei,
            balance_deltas_gwei,
            pending_shares_gwei: current_shares_gwei
                + i128::from(pod_balance_gwei)
                + i128::from(balance_deltas_gwei),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckpointError {
    #[error("Cannot {action} while {phase}")]
    InvalidTransition {
        phase: &'static str,
        action: &'static str,
    },

    #[error("{submitted} proofs submitted but only {remaining} remaining")]
    OverSubmission { remaining: u64, submitted: u64 },
}

/// Pending proof count of a started checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointProgress {
    checkpoint: Checkpoint,
    remaining: u64,
}

impl CheckpointProgress {
    /// Track `checkpoint`, starting from its on-chain `proofs_remaining`
    #[must_use]
    pub fn new(checkpoint: Checkpoint) -> Self {
        Self {
            remaining: checkpoint.proofs_remaining,
            checkpoint,
        }
    }

    /// Record `proven` newly accepted proofs.
    ///
    /// # Errors
    /// Returns [`CheckpointError::OverSubmission`] if more proofs are
    /// recorded than remain. The count is left unchanged.
    pub fn record(&mut self, proven: u64) -> Result<(), CheckpointError> {
        self.remaining =
            self.remaining
                .checked_sub(proven)
                .ok_or(CheckpointError::OverSubmission {
                    remaining: self.remaining,
                    submitted: proven,
                })?;
        Ok(())
    }

    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    #[must_use]
    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    /// The phase this progress corresponds to
    #[must_use]
    pub fn into_phase(self) -> CheckpointPhase {
        if self.is_complete() {
            CheckpointPhase::Completed(self.checkpoint)
        } else {
            CheckpointPhase::ProofsPending(self)
        }
    }
}

/// Where a pod is in its checkpoint lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointPhase {
    NoActiveCheckpoint,
    Started(Checkpoint),
    ProofsPending(CheckpointProgress),
    Completed(Checkpoint),
}

impl CheckpointPhase {
    /// Phase implied by the pod's current checkpoint, if any
    #[must_use]
    pub fn from_onchain(active: Option<Checkpoint>) -> Self {
        active.map_or(Self::NoActiveCheckpoint, Self::Started)
    }

    /// # Errors
    /// Only a pod without an active checkpoint can start one.
    pub fn start(self, checkpoint: Checkpoint) -> Result<Self, CheckpointError> {
        match self {
            Self::NoActiveCheckpoint => Ok(Self::Started(checkpoint)),
            other => Err(other.invalid("start a checkpoint")),
        }
    }

    /// Move a started checkpoint into proof submission.
    ///
    /// # Errors
    /// Fails unless the checkpoint has just started.
    pub fn await_proofs(self) -> Result<Self, CheckpointError> {
        match self {
            Self::Started(checkpoint) => Ok(CheckpointProgress::new(checkpoint).into_phase()),
            other => Err(other.invalid("await proofs")),
        }
    }

    /// Record `proven` accepted proofs.
    ///
    /// # Errors
    /// Fails unless proofs are pending, or if more are recorded than remain.
    pub fn record(self, proven: u64) -> Result<Self, CheckpointError> {
        match self {
            Self::ProofsPending(mut progress) => {
                progress.record(proven)?;
                Ok(progress.into_phase())
            }
            other => Err(other.invalid("record proofs")),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::NoActiveCheckpoint => "no checkpoint is active",
            Self::Started(_) => "the checkpoint has just started",
            Self::ProofsPending(_) => "proofs are pending",
            Self::Completed(_) => "the checkpoint is completed",
        }
    }

    /// Proofs still owed, `None` when no checkpoint is active
    #[must_use]
    pub fn proofs_remaining(&self) -> Option<u64> {
        match self {
            Self::NoActiveCheckpoint => None,
            Self::Started(checkpoint) => Some(checkpoint.proofs_remaining),
            Self::ProofsPending(progress) => Some(progress.remaining()),
            Self::Completed(_) => Some(0),
        }
    }

    fn invalid(&self, action: &'static str) -> CheckpointError {
        CheckpointError::InvalidTransition {
            phase: self.name(),
            action,
        }
    }
}

/// Validators a checkpoint still needs a balance proof for: active in the pod
/// and not yet included in a checkpoint at or after its start.
#[must_use]
pub fn checkpoint_targets(validators: &[PodValidator], checkpoint: &Checkpoint) -> Vec<u64> {
    validators
        .iter()
        .filter(|v| {
            v.status == ValidatorStatus::Active
                && v.last_checkpointed_at < checkpoint.started_at_timestamp
        })
        .map(|v| v.index)
        .collect()
}

/// Proofs for one `verifyCheckpointProofs` run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointProofs {
    pub balance_container_proof: BalanceContainerProof,
    pub balance_proofs: Vec<BalanceProof>,
}

impl CheckpointProofs {
    #[must_use]
    pub fn validator_indices(&self) -> Vec<u64> {
        self.balance_proofs.iter().map(|p| p.validator_index).collect()
    }

    /// Render as the JSON proof document
    #[must_use]
    pub fn to_document(&self, snapshot: &BeaconStateSnapshot) -> ProofDocument {
        ProofDocument {
            beacon_block_root: snapshot.block_root(),
            slot: snapshot.slot(),
            beacon_timestamp: snapshot.timestamp(),
            state_root_proof: None,
            validator_balances_root_proof: Some(BalanceContainerEntry::from(
                &self.balance_container_proof,
            )),
            per_validator: self.balance_proofs.iter().map(Into::into).collect(),
        }
    }
}

/// Fail unless `snapshot` is the block `checkpoint` committed to.
///
/// # Errors
/// Returns [`ProofError::StaleCheckpointRoot`] on mismatch.
pub fn ensure_checkpoint_snapshot(
    snapshot: &BeaconStateSnapshot,
    checkpoint: &Checkpoint,
) -> Result<(), ProofError> {
    if snapshot.block_root() != checkpoint.beacon_block_root {
        return Err(ProofError::StaleCheckpointRoot {
            checkpoint: format!("0x{}", hex::encode(checkpoint.beacon_block_root)),
            snapshot: format!("0x{}", hex::encode(snapshot.block_root())),
        });
    }
    Ok(())
}

/// Build the balance container proof and one balance proof per index.
///
/// # Errors
/// Fails if the snapshot is not the checkpoint's block, or if any proof cannot
/// be built or does not verify.
#[instrument(skip_all, fields(validators = validator_indices.len()))]
pub fn build_checkpoint_proof(
    snapshot: &BeaconStateSnapshot,
    checkpoint: &Checkpoint,
    validator_indices: &[u64],
    workers: &ProofWorkers,
) -> Result<CheckpointProofs, ProofError> {
    ensure_checkpoint_snapshot(snapshot, checkpoint)?;

    let prover = StateProver::new(snapshot);
    let balance_container_proof = prover.prove_balance_container()?;

    let container_root = balance_container_proof.balance_container_root;
    let balance_proofs = workers.map(validator_indices, |&index| {
        let proof = prover
            .prove_balance(index)
            .map_err(|e| e.for_validator(index))?;
        if !proof.proof.verify(&container_root) {
            return Err(ProofError::VerificationMismatch { artifact: "balance" }.for_validator(index));
        }
        Ok(proof)
    })?;
    debug!(count = balance_proofs.len(), "Built balance proofs");

    Ok(CheckpointProofs {
        balance_container_proof,
        balance_proofs,
    })
}

/// Inputs to the share projection shown by `status`
#[derive(Debug, Clone)]
pub struct PodState {
    pub current_shares_gwei: i128,
    pub pod_balance_gwei: u64,
    pub withdrawable_restaked_gwei: u64,
    pub validators: Vec<PodValidator>,
    pub checkpoint: Option<Checkpoint>,
}

impl PodState {
    /// Native ETH in the pod a new checkpoint would credit
    #[must_use]
    pub fn creditable_native_gwei(&self) -> i128 {
        i128::from(self.pod_balance_gwei) - i128::from(self.withdrawable_restaked_gwei)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionSource {
    /// Shares the active checkpoint will settle at
    ActiveCheckpoint,
    /// What a checkpoint started now would settle at
    Preview,
}

/// Shares before and after the next checkpoint completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareProjection {
    pub source: ProjectionSource,
    pub current_shares_gwei: i128,
    pub projected_shares_gwei: i128,
}

impl ShareProjection {
    #[must_use]
    pub fn compute(state: &PodState) -> Self {
        if let Some(checkpoint) = &state.checkpoint {
            return Self {
                source: ProjectionSource::ActiveCheckpoint,
                current_shares_gwei: state.current_shares_gwei,
                projected_shares_gwei: checkpoint.pending_shares_gwei,
            };
        }

        let beacon_delta: i128 = state
            .validators
            .iter()
            .filter(|v| v.status == ValidatorStatus::Active)
            .map(|v| i128::from(v.balance_gwei) - i128::from(v.restaked_balance_gwei))
            .sum();

        Self {
            source: ProjectionSource::Preview,
            current_shares_gwei: state.current_shares_gwei,
            projected_shares_gwei: state.current_shares_gwei
                + state.creditable_native_gwei()
                + beacon_delta,
        }
    }

    #[must_use]
    pub fn delta_gwei(&self) -> i128 {
        self.projected_shares_gwei - self.current_shares_gwei
    }

    #[must_use]
    pub fn delta_eth(&self) -> f64 {
        gwei_to_eth(self.delta_gwei())
    }
}

/// Lossy conversion for display
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn gwei_to_eth(gwei: i128) -> f64 {
    gwei as f64 / GWEI_PER_ETH
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, SyntheticState};
    use proptest::prelude::*;

    fn checkpoint(proofs_remaining: u64) -> Checkpoint {
        Checkpoint::new(1_700_000_000, [0x11; 32], proofs_remaining, 1_000, -250, 64_000_000_000)
    }

    fn pod_validator(index: u64, status: ValidatorStatus, last_checkpointed_at: u64) -> PodValidator {
        PodValidator {
            index,
            validator: testing::validator(index, &[0x42; 20]),
            status,
            balance_gwei: 32_000_000_000,
            restaked_balance_gwei: 32_000_000_000,
            last_checkpointed_at,
        }
    }

    #[test]
    fn test_pending_shares() {
        assert_eq!(checkpoint(1).pending_shares_gwei, 64_000_000_750);
    }

    #[test]
    fn test_lifecycle() {
        let phase = CheckpointPhase::from_onchain(None);
        assert_eq!(phase, CheckpointPhase::NoActiveCheckpoint);

        let phase = phase.start(checkpoint(3)).unwrap();
        assert_eq!(phase.proofs_remaining(), Some(3));

        let phase = phase.await_proofs().unwrap();
        assert!(matches!(phase, CheckpointPhase::ProofsPending(_)));

        let phase = phase.record(2).unwrap();
        assert_eq!(phase.proofs_remaining(), Some(1));

        let phase = phase.record(1).unwrap();
        assert!(matches!(phase, CheckpointPhase::Completed(_)));
        assert_eq!(phase.proofs_remaining(), Some(0));
    }

    #[test]
    fn test_completed_is_terminal() {
        let phase = CheckpointPhase::Completed(checkpoint(0));
        assert!(phase.clone().record(0).is_err());
        assert!(phase.clone().await_proofs().is_err());
        assert!(phase.start(checkpoint(1)).is_err());
    }

    #[test]
    fn test_start_requires_no_active_checkpoint() {
        let phase = CheckpointPhase::from_onchain(Some(checkpoint(2)));
        assert_eq!(
            phase.start(checkpoint(2)).unwrap_err(),
            CheckpointError::InvalidTransition {
                phase: "the checkpoint has just started",
                action: "start a checkpoint",
            }
        );
    }

    #[test]
    fn test_zero_proofs_completes_immediately() {
        let phase = CheckpointPhase::Started(checkpoint(0)).await_proofs().unwrap();
        assert!(matches!(phase, CheckpointPhase::Completed(_)));
    }

    #[test]
    fn test_over_submission_leaves_count() {
        let mut progress = CheckpointProgress::new(checkpoint(2));
        assert_eq!(
            progress.record(3).unwrap_err(),
            CheckpointError::OverSubmission {
                remaining: 2,
                submitted: 3
            }
        );
        assert_eq!(progress.remaining(), 2);
    }

    #[test]
    fn test_checkpoint_targets() {
        let cp = checkpoint(2);
        let validators = vec![
            pod_validator(1, ValidatorStatus::Active, 0),
            pod_validator(2, ValidatorStatus::Inactive, 0),
            pod_validator(3, ValidatorStatus::Active, cp.started_at_timestamp),
            pod_validator(4, ValidatorStatus::Withdrawn, 0),
            pod_validator(5, ValidatorStatus::Active, cp.started_at_timestamp - 1),
        ];
        assert_eq!(checkpoint_targets(&validators, &cp), vec![1, 5]);
    }

    #[test]
    fn test_build_checkpoint_proof() {
        let (_, snapshot) = testing::synthetic_snapshot(&testing::sample_validators(6), 40).unwrap();
        let mut cp = checkpoint(3);
        cp.beacon_block_root = snapshot.block_root();

        let workers = ProofWorkers::new(2).unwrap();
        let proofs = build_checkpoint_proof(&snapshot, &cp, &[0, 3, 5], &workers).unwrap();

        assert_eq!(proofs.validator_indices(), vec![0, 3, 5]);
        let container = &proofs.balance_container_proof;
        assert!(container.proof.verify(&snapshot.block_root()));
        for balance in &proofs.balance_proofs {
            assert!(balance.proof.verify(&container.balance_container_root));
        }

        let document = proofs.to_document(&snapshot);
        assert!(document.validator_balances_root_proof.is_some());
        assert!(document.per_validator.iter().all(|v| v.balance.is_some()));
    }

    #[test]
    fn test_stale_checkpoint_root() {
        let (_, snapshot) = testing::synthetic_snapshot(&testing::sample_validators(2), 40).unwrap();
        let workers = ProofWorkers::new(1).unwrap();
        let err = build_checkpoint_proof(&snapshot, &checkpoint(1), &[0], &workers).unwrap_err();
        assert!(matches!(err, ProofError::StaleCheckpointRoot { .. }));
    }

    #[test]
    fn test_projection_with_active_checkpoint() {
        let state = PodState {
            current_shares_gwei: 64_000_000_000,
            pod_balance_gwei: 5,
            withdrawable_restaked_gwei: 0,
            validators: vec![],
            checkpoint: Some(checkpoint(1)),
        };
        let projection = ShareProjection::compute(&state);
        assert_eq!(projection.source, ProjectionSource::ActiveCheckpoint);
        assert_eq!(projection.delta_gwei(), 750);
    }

    #[test]
    fn test_projection_preview() {
        let mut grown = pod_validator(1, ValidatorStatus::Active, 0);
        grown.balance_gwei += 2_000_000_000;
        let mut exited = pod_validator(2, ValidatorStatus::Withdrawn, 0);
        exited.balance_gwei = 0;
        let mut unproven = pod_validator(3, ValidatorStatus::Inactive, 0);
        unproven.restaked_balance_gwei = 0;

        let state = PodState {
            current_shares_gwei: 32_000_000_000,
            pod_balance_gwei: 1_500_000_000,
            withdrawable_restaked_gwei: 500_000_000,
            validators: vec![grown, exited, unproven],
            checkpoint: None,
        };
        let projection = ShareProjection::compute(&state);
        assert_eq!(projection.source, ProjectionSource::Preview);
        assert_eq!(projection.delta_gwei(), 3_000_000_000);
        assert!((projection.delta_eth() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_synthetic_balances_are_proven() {
        let (state, snapshot) = SyntheticState::new(5)
            .with_validator(testing::validator(0, &[0x42; 20]), 31_999_999_999)
            .build()
            .unwrap();
        let mut cp = checkpoint(1);
        cp.beacon_block_root = snapshot.block_root();
        let proofs =
            build_checkpoint_proof(&snapshot, &cp, &[0], &ProofWorkers::new(1).unwrap()).unwrap();
        assert_eq!(&proofs.balance_proofs[0].balance_root[..8], &state.balances[0].to_le_bytes());
    }

    proptest! {
        #[test]
        fn prop_progress_is_monotonic(start in 0u64..500, batches in prop::collection::vec(0u64..50, 0..40)) {
            let mut progress = CheckpointProgress::new(checkpoint(start));
            for k in batches {
                let before = progress.remaining();
                match progress.record(k) {
                    Ok(()) => prop_assert_eq!(progress.remaining(), before - k),
                    Err(_) => {
                        prop_assert!(k > before);
                        prop_assert_eq!(progress.remaining(), before);
                    }
                }
            }
        }
    }
}
