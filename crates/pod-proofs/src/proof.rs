//! Proof artifacts for EigenPod verification.
//!
//! The pod contract accepts two proof families:
//! 1. Withdrawal credential proofs: a [`StateRootProof`] tying the state root
//!    to a block root, plus one [`ValidatorFieldsProof`] per validator.
//! 2. Checkpoint proofs: a [`BalanceContainerProof`] tying the balances list
//!    root to a block root, plus one [`BalanceProof`] per validator.
//!
//! Every artifact is self-verified when built and never mutated afterwards.

use crate::merkle::{MerkleError, MerkleProof};
use crate::types::{hex_bytes, hex_bytes32, hex_bytes32_vec};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during proof generation.
#[derive(Error, Debug)]
pub enum ProofError {
    #[error("Validator index {0} out of bounds (validator count {1})")]
    ValidatorIndexOutOfBounds(u64, usize),

    #[error("Validator {0} does not withdraw to the pod")]
    ValidatorNotFound(u64),

    #[error("Snapshot block root {snapshot} does not match checkpoint block root {checkpoint}")]
    StaleCheckpointRoot { checkpoint: String, snapshot: String },

    #[error("{artifact} proof failed self-verification")]
    VerificationMismatch { artifact: &'static str },

    #[error("Proof for validator {index} failed: {source}")]
    Validator {
        index: u64,
        #[source]
        source: Box<ProofError>,
    },

    #[error(transparent)]
    Merkle(#[from] MerkleError),

    #[error("Failed to start proof workers: {0}")]
    WorkerPool(String),
}

impl ProofError {
    /// Attach the validator a per-validator failure belongs to
    #[must_use]
    pub fn for_validator(self, index: u64) -> Self {
        match self {
            already @ Self::Validator { .. } => already,
            other => Self::Validator {
                index,
                source: Box::new(other),
            },
        }
    }
}

/// Proof of the beacon state root against the beacon block root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateRootProof {
    #[serde(with = "hex_bytes32")]
    pub beacon_state_root: [u8; 32],
    pub proof: MerkleProof,
}

/// Proof of a validator container against the beacon state root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorFieldsProof {
    pub validator_index: u64,
    /// The eight field chunks the contract re-hashes into the container root
    #[serde(with = "hex_bytes32_vec")]
    pub fields: Vec<[u8; 32]>,
    pub proof: MerkleProof,
}

/// Proof of the `balances` list root against the beacon block root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceContainerProof {
    #[serde(with = "hex_bytes32")]
    pub balance_container_root: [u8; 32],
    pub proof: MerkleProof,
}

/// Proof of the chunk holding a validator's balance against the balances root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceProof {
    pub validator_index: u64,
    #[serde(with = "hex_bytes32")]
    pub pubkey_hash: [u8; 32],
    /// Packed chunk of four balances, one of which is this validator's
    #[serde(with = "hex_bytes32")]
    pub balance_root: [u8; 32],
    pub proof: MerkleProof,
}

/// JSON document handed to users and downstream tooling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofDocument {
    #[serde(with = "hex_bytes32")]
    pub beacon_block_root: [u8; 32],
    pub slot: u64,
    pub beacon_timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_root_proof: Option<StateRootEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator_balances_root_proof: Option<BalanceContainerEntry>,
    pub per_validator: Vec<ValidatorProofEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateRootEntry {
    #[serde(with = "hex_bytes32")]
    pub beacon_state_root: [u8; 32],
    #[serde(with = "hex_bytes")]
    pub proof: Vec<u8>,
}

impl From<&StateRootProof> for StateRootEntry {
    fn from(p: &StateRootProof) -> Self {
        Self {
            beacon_state_root: p.beacon_state_root,
            proof: p.proof.path_bytes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceContainerEntry {
    #[serde(with = "hex_bytes32")]
    pub balance_container_root: [u8; 32],
    #[serde(with = "hex_bytes")]
    pub proof: Vec<u8>,
}

impl From<&BalanceContainerProof> for BalanceContainerEntry {
    fn from(p: &BalanceContainerProof) -> Self {
        Self {
            balance_container_root: p.balance_container_root,
            proof: p.proof.path_bytes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorProofEntry {
    pub index: u64,
    #[serde(flatten)]
    pub balance: Option<BalanceEntry>,
    #[serde(flatten)]
    pub fields: Option<FieldsEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceEntry {
    #[serde(with = "hex_bytes")]
    pub balance_proof: Vec<u8>,
    #[serde(with = "hex_bytes32")]
    pub balance_root: [u8; 32],
    #[serde(with = "hex_bytes32")]
    pub pubkey_hash: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldsEntry {
    #[serde(with = "hex_bytes")]
    pub fields_proof: Vec<u8>,
    #[serde(with = "hex_bytes32_vec")]
    pub fields: Vec<[u8; 32]>,
}

impl From<&BalanceProof> for ValidatorProofEntry {
    fn from(p: &BalanceProof) -> Self {
        Self {
            index: p.validator_index,
            balance: Some(BalanceEntry {
                balance_proof: p.proof.path_bytes(),
                balance_root: p.balance_root,
                pubkey_hash: p.pubkey_hash,
            }),
            fields: None,
        }
    }
}

impl From<&ValidatorFieldsProof> for ValidatorProofEntry {
    fn from(p: &ValidatorFieldsProof) -> Self {
        Self {
            index: p.validator_index,
            balance: None,
            fields: Some(FieldsEntry {
                fields_proof: p.proof.path_bytes(),
                fields: p.fields.clone(),
            }),
        }
    }
}
