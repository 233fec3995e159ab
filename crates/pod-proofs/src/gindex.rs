//! Generalized Index Computation
//!
//! Computes generalized indices (gindices) for SSZ Merkle proofs.
//! These must match the gindices the EigenPod contract verifies against.

use crate::types::StateLayout;

/// Calculator for generalized indices in the beacon state tree
#[derive(Debug, Clone, Copy)]
pub struct GindexCalculator;

impl GindexCalculator {
    // BeaconBlockHeader structure constants
    // Header has 5 fields, tree depth 3 (2^3 = 8 >= 5)
    pub const HEADER_TREE_DEPTH: u32 = 3;
    const HEADER_BASE_GINDEX: u64 = 8; // 2^3

    // state_root is field index 3 in header
    const STATE_ROOT_FIELD_INDEX: u64 = 3;

    // Field indices in BeaconState (0-indexed)
    pub const VALIDATORS_FIELD_INDEX: u64 = 11;
    pub const BALANCES_FIELD_INDEX: u64 = 12;

    // Validator has 8 fields, tree depth 3 (2^3 = 8)
    pub const VALIDATOR_TREE_DEPTH: u32 = 3;
    pub const VALIDATOR_FIELD_COUNT: usize = 8;

    // Balances are packed four u64 per chunk
    pub const BALANCES_PER_CHUNK: u64 = 4;

    /// List data root is the left child of the list root, the length the right.
    const LIST_DATA_GINDEX: u64 = 2;

    /// Compute gindex for `state_root` from the block root
    #[must_use]
    pub const fn state_root_gindex() -> u64 {
        Self::HEADER_BASE_GINDEX + Self::STATE_ROOT_FIELD_INDEX
    }

    /// Compute gindex of a top-level field within the beacon state tree
    #[must_use]
    pub fn state_field_gindex(layout: &StateLayout, field_index: u64) -> u64 {
        (1_u64 << layout.state_tree_depth()) + field_index
    }

    /// Compute gindex for the `balances` list root from the block root
    ///
    /// Path: header → state_root → balances
    #[must_use]
    pub fn balance_container_gindex(layout: &StateLayout) -> u64 {
        Self::concat_gindices(&[
            Self::state_root_gindex(),
            Self::state_field_gindex(layout, Self::BALANCES_FIELD_INDEX),
        ])
    }

    /// Compute gindex for the `validators[i]` container root from the state root
    ///
    /// Path: state_root → validators → data_root → [i]
    #[must_use]
    pub fn validator_container_gindex(layout: &StateLayout, validator_index: u64) -> u64 {
        let element_gindex_in_data = (1_u64 << layout.validators_tree_depth) + validator_index;

        Self::concat_gindices(&[
            Self::state_field_gindex(layout, Self::VALIDATORS_FIELD_INDEX),
            Self::LIST_DATA_GINDEX,
            element_gindex_in_data,
        ])
    }

    /// Compute gindex for the chunk holding `balances[i]` from the balances list root
    ///
    /// Path: balances → data_root → [i / 4]
    #[must_use]
    pub fn balance_chunk_gindex(layout: &StateLayout, validator_index: u64) -> u64 {
        let chunk_gindex_in_data =
            (1_u64 << layout.balances_tree_depth) + validator_index / Self::BALANCES_PER_CHUNK;

        Self::concat_gindices(&[Self::LIST_DATA_GINDEX, chunk_gindex_in_data])
    }

    /// Concatenate generalized indices along a path
    ///
    /// Given a sequence of gindices representing a path through nested structures,
    /// compute the final gindex from the outermost root.
    #[must_use]
    pub fn concat_gindices(gindices: &[u64]) -> u64 {
        let mut result = 1_u64; // Start at root

        for &gindex in gindices {
            let depth = Self::gindex_depth(gindex);
            result = (result << depth) | (gindex ^ (1_u64 << depth));
        }

        result
    }

    /// Compute the depth (number of proof elements) for a given gindex.
    ///
    /// `gindex` must be non-zero.
    #[must_use]
    pub const fn gindex_depth(gindex: u64) -> u32 {
        63 - gindex.leading_zeros()
    }

    /// Expected proof length for a validator container against the state root
    #[must_use]
    pub fn validator_proof_length(layout: &StateLayout) -> u32 {
        Self::gindex_depth(Self::validator_container_gindex(layout, 0))
    }

    /// Expected proof length for a balance chunk against the balances root
    #[must_use]
    pub fn balance_proof_length(layout: &StateLayout) -> u32 {
        Self::gindex_depth(Self::balance_chunk_gindex(layout, 0))
    }
}
