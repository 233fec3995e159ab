//! # Pod Proof Library
//!
//! SSZ Merkle proof generation for EigenPod restaking. Builds the proofs the
//! pod contract verifies for:
//! - withdrawal credentials: `validators[i]` against the beacon state root
//! - checkpoints: `balances` against the block root, then each balance chunk
//!   against the `balances` root
//!
//! Proofs are built from a [`BeaconStateSnapshot`], an immutable view of one
//! decoded state with its sparse Merkle trees prebuilt.

pub mod beacon_client;
pub mod beacon_state;
pub mod checkpoint;
pub mod credentials;
pub mod gindex;
pub mod merkle;
pub mod proof;
pub mod snapshot;
pub mod state_prover;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;
pub mod workers;

pub use beacon_client::{BeaconApi, BeaconClient, BeaconClientError, StateId};
pub use checkpoint::{
    build_checkpoint_proof, checkpoint_targets, Checkpoint, CheckpointError, CheckpointPhase,
    CheckpointProgress, CheckpointProofs, PodState, ShareProjection,
};
pub use credentials::{build_credential_proofs, find_matching_validators, CredentialProofs};
pub use gindex::GindexCalculator;
pub use merkle::{MerkleError, MerkleProof, MerkleTree};
pub use proof::{ProofDocument, ProofError};
pub use snapshot::{BeaconStateSnapshot, SnapshotError};
pub use state_prover::StateProver;
pub use types::*;
pub use workers::ProofWorkers;
