//! Withdrawal credential proofs.
//!
//! Finds the validators whose `0x01` withdrawal credentials point at a pod and
//! proves their validator containers against the state root, so the pod can
//! start counting their balances.

use crate::proof::{
    ProofDocument, ProofError, StateRootEntry, StateRootProof, ValidatorFieldsProof,
};
use crate::snapshot::BeaconStateSnapshot;
use crate::state_prover::StateProver;
use crate::types::{Validator, ValidatorWithIndex};
use crate::workers::ProofWorkers;
use tracing::{debug, info, instrument};

/// Everything `verifyWithdrawalCredentials` needs for one set of validators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialProofs {
    pub state_root_proof: StateRootProof,
    pub validator_proofs: Vec<ValidatorFieldsProof>,
}

impl CredentialProofs {
    #[must_use]
    pub fn validator_indices(&self) -> Vec<u64> {
        self.validator_proofs
            .iter()
            .map(|p| p.validator_index)
            .collect()
    }

    /// Render as the JSON proof document
    #[must_use]
    pub fn to_document(&self, snapshot: &BeaconStateSnapshot) -> ProofDocument {
        ProofDocument {
            beacon_block_root: snapshot.block_root(),
            slot: snapshot.slot(),
            beacon_timestamp: snapshot.timestamp(),
            state_root_proof: Some(StateRootEntry::from(&self.state_root_proof)),
            validator_balances_root_proof: None,
            per_validator: self.validator_proofs.iter().map(Into::into).collect(),
        }
    }
}

/// Scan `validators` in index order for credentials pointing at `pod_address`.
#[must_use]
pub fn scan_validators(
    validators: &[Validator],
    pod_address: &[u8; 20],
) -> Vec<ValidatorWithIndex> {
    let mut matching = Vec::new();
    for (index, validator) in (0u64..).zip(validators) {
        if validator.withdraws_to(pod_address) {
            matching.push(ValidatorWithIndex {
                index,
                validator: validator.clone(),
            });
        }
    }
    matching
}

/// Find the validators withdrawing to `pod_address`.
///
/// With `specific_index`, the result is exactly that validator.
///
/// # Errors
/// Returns [`ProofError::ValidatorNotFound`] if `specific_index` is absent
/// from the state or does not withdraw to the pod.
#[instrument(skip(snapshot, pod_address), fields(pod = %hex::encode(pod_address), slot = snapshot.slot()))]
pub fn find_matching_validators(
    snapshot: &BeaconStateSnapshot,
    pod_address: &[u8; 20],
    specific_index: Option<u64>,
) -> Result<Vec<ValidatorWithIndex>, ProofError> {
    if let Some(index) = specific_index {
        return match snapshot.validator(index) {
            Some(validator) if validator.withdraws_to(pod_address) => {
                Ok(vec![ValidatorWithIndex {
                    index,
                    validator: validator.clone(),
                }])
            }
            _ => Err(ProofError::ValidatorNotFound(index)),
        };
    }

    let matching = scan_validators(snapshot.validators(), pod_address);
    info!(
        scanned = snapshot.validators().len(),
        matching = matching.len(),
        "Scanned validator registry"
    );
    Ok(matching)
}

/// Build one fields proof per validator index plus the shared state root proof.
///
/// Proofs are built on `workers` and returned in input order.
///
/// # Errors
/// Fails on the first validator whose proof cannot be built or does not verify.
#[instrument(skip_all, fields(validators = validator_indices.len()))]
pub fn build_credential_proofs(
    snapshot: &BeaconStateSnapshot,
    validator_indices: &[u64],
    workers: &ProofWorkers,
) -> Result<CredentialProofs, ProofError> {
    let prover = StateProver::new(snapshot);
    let state_root_proof = prover.prove_state_root()?;

    let validator_proofs = workers.map(validator_indices, |&index| {
        prover
            .prove_validator_fields(index)
            .map_err(|e| e.for_validator(index))
    })?;
    debug!(count = validator_proofs.len(), "Built validator fields proofs");

    Ok(CredentialProofs {
        state_root_proof,
        validator_proofs,
    })
}
