//! SSZ Merkle Trees and Proofs
//!
//! Binary SHA-256 hash trees over 32-byte chunks, as used by SSZ merkleization.
//!
//! # Approach
//! Trees are sparse: a tree of depth `d` has `2^d` leaf slots, but only the
//! chunks actually supplied are stored. Every slot past the end is a virtual
//! zero leaf, and any subtree made only of virtual leaves is replaced by a
//! precomputed "zero hash". This keeps `List<Validator, 2^40>` proofs in
//! memory proportional to the number of validators, the same approach used by
//! consensus clients like Lighthouse.

use crate::gindex::GindexCalculator;
use crate::types::{hex_bytes32, hex_bytes32_vec};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use thiserror::Error;

/// Width of a tree node in bytes
pub const CHUNK_SIZE: usize = 32;

/// Deepest tree whose generalized indices still fit in a `u64`
pub const MAX_TREE_DEPTH: u32 = 63;

/// Errors from tree construction and proof assembly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("Malformed tree: {0} leaves is not a power of two")]
    MalformedTree(usize),

    #[error("Generalized index {gindex} is not a leaf of a tree with {leaf_count} leaves")]
    GindexOutOfRange { gindex: u64, leaf_count: usize },

    #[error("Leaf {index} is {len} bytes, longer than a {CHUNK_SIZE}-byte chunk")]
    LeafTooLong { index: usize, len: usize },

    #[error("Leaf index {index} out of range for tree depth {depth}")]
    IndexOutOfRange { index: u64, depth: u32 },

    #[error("{count} chunks do not fit in a tree of depth {depth}")]
    TooManyChunks { count: usize, depth: u32 },

    #[error("Tree depth {0} exceeds the maximum of {MAX_TREE_DEPTH}")]
    DepthTooLarge(u32),

    #[error("Cannot chain proofs: inner root does not match outer leaf")]
    DisjointProofs,
}

/// Zero hashes for each depth level.
/// `zero_hashes()[0]` is the all-zero leaf,
/// `zero_hashes()[i] = hash(zero_hashes()[i-1], zero_hashes()[i-1])`.
fn zero_hashes() -> &'static [[u8; 32]] {
    static ZERO_HASHES: OnceLock<Vec<[u8; 32]>> = OnceLock::new();
    ZERO_HASHES.get_or_init(|| {
        let mut hashes = vec![[0u8; 32]; MAX_TREE_DEPTH as usize + 1];
        let mut hasher = Sha256::new();
        for i in 1..hashes.len() {
            hasher.update(hashes[i - 1]);
            hasher.update(hashes[i - 1]);
            hashes[i] = hasher.finalize_reset().into();
        }
        hashes
    })
}

/// Root of an all-zero subtree of the given depth.
#[must_use]
pub fn zero_hash(depth: usize) -> [u8; 32] {
    zero_hashes()[depth]
}

/// SHA-256 hash of two 32-byte nodes
#[must_use]
pub fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Right-pad a short value with zeros to a full chunk.
///
/// Returns `None` if the value does not fit in one chunk.
#[must_use]
pub fn pad_leaf(bytes: &[u8]) -> Option<[u8; 32]> {
    if bytes.len() > CHUNK_SIZE {
        return None;
    }
    let mut chunk = [0u8; 32];
    chunk[..bytes.len()].copy_from_slice(bytes);
    Some(chunk)
}

/// SSZ encoding of a `uint64` as a chunk (little-endian, zero-padded).
#[must_use]
pub fn uint64_chunk(value: u64) -> [u8; 32] {
    let mut chunk = [0u8; 32];
    chunk[..8].copy_from_slice(&value.to_le_bytes());
    chunk
}

/// Mix in the length for a List's Merkle root.
/// `list_root = hash(data_root, length_as_le_bytes32)`
#[must_use]
pub fn mix_in_length(data_root: [u8; 32], length: u64) -> [u8; 32] {
    hash_pair(&data_root, &uint64_chunk(length))
}

/// A sparse binary Merkle tree.
///
/// `layers[0]` holds the supplied leaf chunks and `layers[d]` the nodes at
/// height `d` that have at least one real leaf below them. `layers[depth]`
/// has at most one node, the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    depth: u32,
    layers: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
    /// Build a tree with `2^depth` leaf slots from the leading `chunks`.
    ///
    /// # Errors
    /// Fails if the depth is too large or the chunks do not fit.
    pub fn from_chunks(chunks: Vec<[u8; 32]>, depth: u32) -> Result<Self, MerkleError> {
        if depth > MAX_TREE_DEPTH {
            return Err(MerkleError::DepthTooLarge(depth));
        }
        if chunks.len() as u128 > 1u128 << depth {
            return Err(MerkleError::TooManyChunks {
                count: chunks.len(),
                depth,
            });
        }

        let mut layers = Vec::with_capacity(depth as usize + 1);
        let mut current = chunks;
        for level in 0..depth as usize {
            let parents = current
                .chunks(2)
                .map(|pair| {
                    let right = pair.get(1).copied().unwrap_or_else(|| zero_hash(level));
                    hash_pair(&pair[0], &right)
                })
                .collect();
            layers.push(std::mem::replace(&mut current, parents));
        }
        layers.push(current);

        Ok(Self { depth, layers })
    }

    /// Tree depth (number of proof elements for any leaf)
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Root of the tree
    #[must_use]
    pub fn root(&self) -> [u8; 32] {
        self.node(self.depth as usize, 0)
    }

    /// Leaf chunk at `index`, zero for virtual leaves
    #[must_use]
    pub fn leaf(&self, index: u64) -> [u8; 32] {
        self.node(0, index)
    }

    fn node(&self, level: usize, position: u64) -> [u8; 32] {
        usize::try_from(position)
            .ok()
            .and_then(|p| self.layers[level].get(p))
            .copied()
            .unwrap_or_else(|| zero_hash(level))
    }

    /// Sibling hashes from the leaf at `index` up to the root.
    ///
    /// # Errors
    /// Fails if `index` is not a leaf slot of this tree.
    pub fn branch(&self, index: u64) -> Result<Vec<[u8; 32]>, MerkleError> {
        self.check_index(index)?;
        let mut position = index;
        let mut branch = Vec::with_capacity(self.depth as usize);
        for level in 0..self.depth as usize {
            branch.push(self.node(level, position ^ 1));
            position >>= 1;
        }
        Ok(branch)
    }

    /// Proof for the leaf at `index` against this tree's root.
    ///
    /// # Errors
    /// Fails if `index` is not a leaf slot of this tree.
    pub fn prove(&self, index: u64) -> Result<MerkleProof, MerkleError> {
        let path = self.branch(index)?;
        Ok(MerkleProof {
            leaf: self.leaf(index),
            path,
            gindex: (1u64 << self.depth) | index,
            root: self.root(),
        })
    }

    fn check_index(&self, index: u64) -> Result<(), MerkleError> {
        if u128::from(index) >= 1u128 << self.depth {
            return Err(MerkleError::IndexOutOfRange {
                index,
                depth: self.depth,
            });
        }
        Ok(())
    }
}

/// A single-leaf Merkle proof.
///
/// `path` runs from the leaf's sibling up to the child of `root`; bit `i` of
/// `gindex` (counting from the least significant bit) tells whether the node
/// at height `i` is a right child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    #[serde(with = "hex_bytes32")]
    pub leaf: [u8; 32],
    #[serde(with = "hex_bytes32_vec")]
    pub path: Vec<[u8; 32]>,
    pub gindex: u64,
    #[serde(with = "hex_bytes32")]
    pub root: [u8; 32],
}

impl MerkleProof {
    /// Fold `path` into `leaf`. `None` if the path length disagrees with the gindex.
    #[must_use]
    pub fn compute_root(&self) -> Option<[u8; 32]> {
        if self.gindex == 0 || self.path.len() != GindexCalculator::gindex_depth(self.gindex) as usize
        {
            return None;
        }

        let mut node = self.leaf;
        let mut gindex = self.gindex;
        for sibling in &self.path {
            node = if gindex & 1 == 1 {
                hash_pair(sibling, &node)
            } else {
                hash_pair(&node, sibling)
            };
            gindex >>= 1;
        }
        Some(node)
    }

    /// Whether this proof ties `leaf` to `expected_root`.
    #[must_use]
    pub fn verify(&self, expected_root: &[u8; 32]) -> bool {
        self.compute_root().is_some_and(|root| &root == expected_root)
    }

    /// Chain this proof under `outer`, whose leaf is this proof's root.
    ///
    /// # Errors
    /// Fails if the two proofs do not meet.
    pub fn extend(mut self, outer: MerkleProof) -> Result<Self, MerkleError> {
        if self.root != outer.leaf {
            return Err(MerkleError::DisjointProofs);
        }
        self.path.extend_from_slice(&outer.path);
        self.gindex = GindexCalculator::concat_gindices(&[outer.gindex, self.gindex]);
        self.root = outer.root;
        Ok(self)
    }

    /// Sibling path flattened into the `bytes` form the pod contract expects
    #[must_use]
    pub fn path_bytes(&self) -> Vec<u8> {
        self.path.concat()
    }
}

/// Build a proof for the leaf at `gindex` of the tree over `leaves`.
///
/// Leaves shorter than a chunk are right-padded with zeros.
///
/// # Errors
/// - [`MerkleError::MalformedTree`] if the leaf count is not a power of two
/// - [`MerkleError::GindexOutOfRange`] if `gindex` is not a leaf of the tree
/// - [`MerkleError::LeafTooLong`] if a leaf exceeds 32 bytes
pub fn build<L: AsRef<[u8]>>(leaves: &[L], gindex: u64) -> Result<MerkleProof, MerkleError> {
    let leaf_count = leaves.len();
    if !leaf_count.is_power_of_two() {
        return Err(MerkleError::MalformedTree(leaf_count));
    }
    let depth = leaf_count.trailing_zeros();
    if gindex == 0 || GindexCalculator::gindex_depth(gindex) != depth {
        return Err(MerkleError::GindexOutOfRange { gindex, leaf_count });
    }

    let chunks = leaves
        .iter()
        .enumerate()
        .map(|(index, leaf)| {
            let bytes = leaf.as_ref();
            pad_leaf(bytes).ok_or(MerkleError::LeafTooLong {
                index,
                len: bytes.len(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    MerkleTree::from_chunks(chunks, depth)?.prove(gindex ^ (1u64 << depth))
}

/// Verify `proof` against `expected_root`. Never panics.
#[must_use]
pub fn verify(proof: &MerkleProof, expected_root: &[u8; 32]) -> bool {
    proof.verify(expected_root)
}
