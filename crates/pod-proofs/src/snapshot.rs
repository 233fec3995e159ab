//! Beacon State Snapshots
//!
//! A [`BeaconStateSnapshot`] is the immutable, proof-ready view of one beacon
//! state: the block header that commits to it, the validator and balance
//! registries, and prebuilt sparse trees for every level a proof passes
//! through. It is built once per run and shared by reference.

use crate::beacon_state::BeaconStateFields;
use crate::gindex::GindexCalculator;
use crate::merkle::{mix_in_length, uint64_chunk, MerkleError, MerkleTree};
use crate::types::{preset, BeaconBlockHeader, StateLayout, Validator};
use rayon::prelude::*;
use ssz_rs::MerkleizationError;
use thiserror::Error;
use tracing::debug;

/// Errors building a snapshot from a decoded state
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("SSZ merkleization failed: {0}")]
    Merkleization(#[from] MerkleizationError),

    #[error(transparent)]
    Merkle(#[from] MerkleError),

    #[error("Expected {expected} state fields, got {actual}")]
    FieldCount { expected: usize, actual: usize },

    #[error("Inconsistent state: header commits to {expected}, state hashes to {computed}")]
    InconsistentState { expected: String, computed: String },
}

/// A list's data tree with its length mixed into the root
#[derive(Debug, Clone)]
pub(crate) struct ListTree {
    pub(crate) data: MerkleTree,
    pub(crate) length: u64,
}

impl ListTree {
    fn new(chunks: Vec<[u8; 32]>, depth: u32, length: u64) -> Result<Self, MerkleError> {
        Ok(Self {
            data: MerkleTree::from_chunks(chunks, depth)?,
            length,
        })
    }

    pub(crate) fn root(&self) -> [u8; 32] {
        mix_in_length(self.data.root(), self.length)
    }

    pub(crate) fn length_chunk(&self) -> [u8; 32] {
        uint64_chunk(self.length)
    }
}

/// Immutable proof-ready view of one beacon state
#[derive(Debug, Clone)]
pub struct BeaconStateSnapshot {
    header: BeaconBlockHeader,
    block_root: [u8; 32],
    timestamp: u64,
    layout: StateLayout,
    validators: Vec<Validator>,
    balances: Vec<u64>,
    header_tree: MerkleTree,
    state_tree: MerkleTree,
    validators_tree: ListTree,
    balances_tree: ListTree,
}

impl BeaconStateSnapshot {
    /// Build a snapshot from a decoded state and the header of its block.
    ///
    /// # Errors
    /// Returns [`SnapshotError::InconsistentState`] when the state does not
    /// hash to `header.state_root`.
    pub fn from_state<S: BeaconStateFields>(
        header: BeaconBlockHeader,
        state: &S,
    ) -> Result<Self, SnapshotError> {
        let layout = S::LAYOUT;
        let validators = state.validators().to_vec();
        let balances = state.balances().to_vec();

        // Hash validators in parallel (this is the expensive part)
        let validator_roots: Vec<[u8; 32]> = validators
            .par_iter()
            .map(validator_root)
            .collect::<Result<_, _>>()?;
        let validators_tree = ListTree::new(
            validator_roots,
            layout.validators_tree_depth,
            validators.len() as u64,
        )?;

        let balances_tree = ListTree::new(
            pack_balances(&balances),
            layout.balances_tree_depth,
            balances.len() as u64,
        )?;

        let field_roots = state.field_roots(validators_tree.root(), balances_tree.root())?;
        if field_roots.len() != layout.field_count {
            return Err(SnapshotError::FieldCount {
                expected: layout.field_count,
                actual: field_roots.len(),
            });
        }
        let state_tree = MerkleTree::from_chunks(field_roots, layout.state_tree_depth())?;

        if state_tree.root() != header.state_root {
            return Err(SnapshotError::InconsistentState {
                expected: format!("0x{}", hex::encode(header.state_root)),
                computed: format!("0x{}", hex::encode(state_tree.root())),
            });
        }

        let header_tree =
            MerkleTree::from_chunks(header.field_chunks(), GindexCalculator::HEADER_TREE_DEPTH)?;
        let timestamp = state.genesis_time() + state.slot() * preset::SECONDS_PER_SLOT;

        debug!(
            slot = header.slot,
            validators = validators.len(),
            block_root = %hex::encode(header_tree.root()),
            "Built beacon state snapshot"
        );

        Ok(Self {
            block_root: header_tree.root(),
            header,
            timestamp,
            layout,
            validators,
            balances,
            header_tree,
            state_tree,
            validators_tree,
            balances_tree,
        })
    }

    #[must_use]
    pub fn header(&self) -> &BeaconBlockHeader {
        &self.header
    }

    /// Root of the beacon block header
    #[must_use]
    pub fn block_root(&self) -> [u8; 32] {
        self.block_root
    }

    #[must_use]
    pub fn state_root(&self) -> [u8; 32] {
        self.header.state_root
    }

    #[must_use]
    pub fn slot(&self) -> u64 {
        self.header.slot
    }

    /// `genesis_time + slot * SECONDS_PER_SLOT`
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    #[must_use]
    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    #[must_use]
    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    #[must_use]
    pub fn validator(&self, index: u64) -> Option<&Validator> {
        usize::try_from(index).ok().and_then(|i| self.validators.get(i))
    }

    #[must_use]
    pub fn balances(&self) -> &[u64] {
        &self.balances
    }

    #[must_use]
    pub fn balance(&self, index: u64) -> Option<u64> {
        usize::try_from(index).ok().and_then(|i| self.balances.get(i)).copied()
    }

    /// Root of the `balances` list, the leaf of the balance container proof
    #[must_use]
    pub fn balances_root(&self) -> [u8; 32] {
        self.balances_tree.root()
    }

    pub(crate) fn header_tree(&self) -> &MerkleTree {
        &self.header_tree
    }

    pub(crate) fn state_tree(&self) -> &MerkleTree {
        &self.state_tree
    }

    pub(crate) fn validators_tree(&self) -> &ListTree {
        &self.validators_tree
    }

    pub(crate) fn balances_tree(&self) -> &ListTree {
        &self.balances_tree
    }
}

/// Root of a validator container, built from its eight field chunks
pub(crate) fn validator_root(validator: &Validator) -> Result<[u8; 32], MerkleError> {
    MerkleTree::from_chunks(
        validator.field_chunks().to_vec(),
        GindexCalculator::VALIDATOR_TREE_DEPTH,
    )
    .map(|tree| tree.root())
}

/// Pack balances four to a chunk, little-endian, as SSZ does for `List<u64, N>`
pub(crate) fn pack_balances(balances: &[u64]) -> Vec<[u8; 32]> {
    balances
        .chunks(4)
        .map(|group| {
            let mut chunk = [0u8; 32];
            for (slot, balance) in chunk.chunks_exact_mut(8).zip(group) {
                slot.copy_from_slice(&balance.to_le_bytes());
            }
            chunk
        })
        .collect()
}
