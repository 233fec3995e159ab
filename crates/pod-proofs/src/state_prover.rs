//! Beacon State Proof Generator
//!
//! Generates the four proof artifacts the pod contract verifies by walking the
//! sparse trees prebuilt in a [`BeaconStateSnapshot`]:
//!
//! - `header → state_root` (depth 3)
//! - `state_root → validators[i]` (state depth + 1 + validators depth)
//! - `header → balances` (3 + state depth)
//! - `balances → chunk(i / 4)` (1 + balances depth)
//!
//! Each proof is checked against its root and its expected gindex before it
//! is returned.

use crate::gindex::GindexCalculator;
use crate::merkle::MerkleProof;
use crate::proof::{
    BalanceContainerProof, BalanceProof, ProofError, StateRootProof, ValidatorFieldsProof,
};
use crate::snapshot::{BeaconStateSnapshot, ListTree};
use crate::types::Validator;

/// Header field index of `state_root`
const STATE_ROOT_FIELD_INDEX: u64 = 3;

/// Proof generator over one snapshot
#[derive(Debug, Clone, Copy)]
pub struct StateProver<'a> {
    snapshot: &'a BeaconStateSnapshot,
}

impl<'a> StateProver<'a> {
    #[must_use]
    pub fn new(snapshot: &'a BeaconStateSnapshot) -> Self {
        Self { snapshot }
    }

    #[must_use]
    pub fn snapshot(&self) -> &'a BeaconStateSnapshot {
        self.snapshot
    }

    /// Prove the state root against the block root.
    ///
    /// # Errors
    /// Returns an error if the proof does not verify.
    pub fn prove_state_root(&self) -> Result<StateRootProof, ProofError> {
        let proof = self.snapshot.header_tree().prove(STATE_ROOT_FIELD_INDEX)?;
        check(
            &proof,
            GindexCalculator::state_root_gindex(),
            &self.snapshot.block_root(),
            "state root",
        )?;

        Ok(StateRootProof {
            beacon_state_root: self.snapshot.state_root(),
            proof,
        })
    }

    /// Prove `validators[validator_index]` against the state root.
    ///
    /// # Errors
    /// Returns an error if the index is out of bounds or the proof does not verify.
    pub fn prove_validator_fields(
        &self,
        validator_index: u64,
    ) -> Result<ValidatorFieldsProof, ProofError> {
        let validator = self.validator(validator_index)?;
        let list = self.snapshot.validators_tree();

        let proof = list
            .data
            .prove(validator_index)?
            .extend(length_mix_in(list))?
            .extend(
                self.snapshot
                    .state_tree()
                    .prove(GindexCalculator::VALIDATORS_FIELD_INDEX)?,
            )?;
        check(
            &proof,
            GindexCalculator::validator_container_gindex(self.snapshot.layout(), validator_index),
            &self.snapshot.state_root(),
            "validator fields",
        )?;

        Ok(ValidatorFieldsProof {
            validator_index,
            fields: validator.field_chunks().to_vec(),
            proof,
        })
    }

    /// Prove the `balances` list root against the block root.
    ///
    /// # Errors
    /// Returns an error if the proof does not verify.
    pub fn prove_balance_container(&self) -> Result<BalanceContainerProof, ProofError> {
        let proof = self
            .snapshot
            .state_tree()
            .prove(GindexCalculator::BALANCES_FIELD_INDEX)?
            .extend(self.snapshot.header_tree().prove(STATE_ROOT_FIELD_INDEX)?)?;
        check(
            &proof,
            GindexCalculator::balance_container_gindex(self.snapshot.layout()),
            &self.snapshot.block_root(),
            "balance container",
        )?;

        Ok(BalanceContainerProof {
            balance_container_root: self.snapshot.balances_root(),
            proof,
        })
    }

    /// Prove the balance chunk holding `balances[validator_index]` against the
    /// balances list root.
    ///
    /// # Errors
    /// Returns an error if the index is out of bounds or the proof does not verify.
    pub fn prove_balance(&self, validator_index: u64) -> Result<BalanceProof, ProofError> {
        let validator = self.validator(validator_index)?;
        let list = self.snapshot.balances_tree();

        let proof = list
            .data
            .prove(validator_index / GindexCalculator::BALANCES_PER_CHUNK)?
            .extend(length_mix_in(list))?;
        check(
            &proof,
            GindexCalculator::balance_chunk_gindex(self.snapshot.layout(), validator_index),
            &self.snapshot.balances_root(),
            "balance",
        )?;

        Ok(BalanceProof {
            validator_index,
            pubkey_hash: validator.pubkey_hash(),
            balance_root: proof.leaf,
            proof,
        })
    }

    fn validator(&self, validator_index: u64) -> Result<&'a Validator, ProofError> {
        let snapshot = self.snapshot;
        if snapshot.balance(validator_index).is_none() {
            return Err(ProofError::ValidatorIndexOutOfBounds(
                validator_index,
                snapshot.balances().len(),
            ));
        }
        snapshot.validator(validator_index).ok_or_else(|| {
            ProofError::ValidatorIndexOutOfBounds(validator_index, snapshot.validators().len())
        })
    }
}

/// One-step proof from a list's data root to the list root
fn length_mix_in(list: &ListTree) -> MerkleProof {
    MerkleProof {
        leaf: list.data.root(),
        path: vec![list.length_chunk()],
        gindex: 2,
        root: list.root(),
    }
}

fn check(
    proof: &MerkleProof,
    expected_gindex: u64,
    expected_root: &[u8; 32],
    artifact: &'static str,
) -> Result<(), ProofError> {
    if proof.gindex != expected_gindex || !proof.verify(expected_root) {
        return Err(ProofError::VerificationMismatch { artifact });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use ssz_rs::prelude::*;

    fn ssz_branch<T: SimpleSerialize>(
        value: &T,
        path: &[PathElement],
    ) -> ([u8; 32], Vec<[u8; 32]>, [u8; 32]) {
        let (proof, witness) = value.prove(path).expect("ssz_rs prove");
        let branch = proof.branch.iter().map(|n| (*n).into()).collect();
        (proof.leaf.into(), branch, witness.into())
    }

    fn synthetic(
        validator_count: u64,
        slot: u64,
    ) -> (crate::beacon_state::MinimalBeaconState, BeaconStateSnapshot) {
        testing::synthetic_snapshot(&testing::sample_validators(validator_count), slot)
            .expect("synthetic snapshot")
    }

    #[test]
    fn test_state_root_proof_verifies() {
        let (_, snapshot) = synthetic(4, 64);
        let proof = StateProver::new(&snapshot).prove_state_root().unwrap();

        assert_eq!(proof.proof.leaf, snapshot.state_root());
        assert_eq!(proof.proof.path.len(), 3);
        assert!(proof.proof.verify(&snapshot.block_root()));
    }

    #[test]
    fn test_cross_validate_validator_with_ssz_rs() {
        let (state, snapshot) = synthetic(5, 3);
        let proof = StateProver::new(&snapshot).prove_validator_fields(2).unwrap();

        let path: &[PathElement] = &["validators".into(), 2usize.into()];
        let (leaf, branch, root) = ssz_branch(&state, path);

        assert_eq!(root, snapshot.state_root());
        assert_eq!(proof.proof.leaf, leaf);
        assert_eq!(proof.proof.path.len(), branch.len());
        for (i, (s, r)) in proof.proof.path.iter().zip(branch.iter()).enumerate() {
            assert_eq!(s, r, "proof node {i} differs");
        }
        assert_eq!(proof.fields, state.validators[2].field_chunks().to_vec());
    }

    #[test]
    fn test_cross_validate_balance_with_ssz_rs() {
        let (state, snapshot) = synthetic(7, 3);
        let proof = StateProver::new(&snapshot).prove_balance(5).unwrap();

        let path: &[PathElement] = &[5usize.into()];
        let (leaf, branch, root) = ssz_branch(&state.balances, path);
        assert_eq!(root, snapshot.balances_root());
        assert_eq!(proof.balance_root, leaf);
        assert_eq!(proof.proof.path, branch);
        assert_eq!(proof.pubkey_hash, state.validators[5].pubkey_hash());
        // chunk 1 holds balances 4..8, balance 5 sits in bytes 8..16
        assert_eq!(&proof.balance_root[8..16], &state.balances[5].to_le_bytes());
    }

    #[test]
    fn test_balance_container_chains_to_block_root() {
        let (state, snapshot) = synthetic(3, 8);
        let prover = StateProver::new(&snapshot);
        let container = prover.prove_balance_container().unwrap();

        let path: &[PathElement] = &["balances".into()];
        let (leaf, branch, root) = ssz_branch(&state, path);
        assert_eq!(root, snapshot.state_root());
        assert_eq!(container.balance_container_root, leaf);
        assert_eq!(&container.proof.path[..branch.len()], branch.as_slice());
        assert!(container.proof.verify(&snapshot.block_root()));

        // a balance proof plus the container proof reaches the block root
        let balance = prover.prove_balance(1).unwrap();
        let chained = balance.proof.clone().extend(container.proof.clone()).unwrap();
        assert!(chained.verify(&snapshot.block_root()));
    }

    #[test]
    fn test_out_of_bounds_index() {
        let (_, snapshot) = synthetic(2, 1);
        let prover = StateProver::new(&snapshot);
        assert!(matches!(
            prover.prove_validator_fields(2),
            Err(ProofError::ValidatorIndexOutOfBounds(2, 2))
        ));
        assert!(matches!(
            prover.prove_balance(10),
            Err(ProofError::ValidatorIndexOutOfBounds(10, 2))
        ));
    }

    #[test]
    fn test_proof_lengths_follow_layout() {
        let (_, snapshot) = synthetic(2, 1);
        let prover = StateProver::new(&snapshot);
        let layout = snapshot.layout();

        let fields = prover.prove_validator_fields(0).unwrap();
        assert_eq!(
            fields.proof.path.len() as u32,
            GindexCalculator::validator_proof_length(layout)
        );
        let balance = prover.prove_balance(0).unwrap();
        assert_eq!(
            balance.proof.path.len() as u32,
            GindexCalculator::balance_proof_length(layout)
        );
    }
}
