//! Full BeaconState SSZ Types
//!
//! Defines the complete Electra (37 fields) and Fulu (38 fields) BeaconState
//! structures with mainnet list limits, as served by
//! `/eth/v2/debug/beacon/states/{state_id}` in SSZ form.
//!
//! Only `validators` and `balances` are proven into. The other fields are
//! decoded so their roots can be folded into the state root.
//!
//! ## Test State Limits
//!
//! With the `testing` feature, [`MinimalBeaconState`] mirrors the Electra
//! layout with small limits so `ssz_rs` can build reference proofs in memory:
//! - Validators: 2^10 = 1024 (tree depth 10)
//! - Balances: 1024 (256 chunks, tree depth 8)

use crate::snapshot::{BeaconStateSnapshot, SnapshotError};
use crate::types::{preset, BeaconBlockHeader, StateLayout, Validator};
use ssz_rs::prelude::*;
use ssz_rs::{HashTreeRoot, MerkleizationError};
use thiserror::Error;

/// Checkpoint for fork choice
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct Checkpoint {
    pub epoch: u64,
    pub root: [u8; 32],
}

/// Eth1 deposit data
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct Eth1Data {
    pub deposit_root: [u8; 32],
    pub deposit_count: u64,
    pub block_hash: [u8; 32],
}

/// Fork data
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct Fork {
    pub previous_version: [u8; 4],
    pub current_version: [u8; 4],
    pub epoch: u64,
}

/// Pending deposit entry (Electra)
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct PendingDeposit {
    pub pubkey: Vector<u8, 48>,
    pub withdrawal_credentials: [u8; 32],
    pub amount: u64,
    pub signature: Vector<u8, 96>,
    pub slot: u64,
}

/// Pending partial withdrawal (Electra)
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct PendingPartialWithdrawal {
    pub validator_index: u64,
    pub amount: u64,
    pub withdrawable_epoch: u64,
}

/// Pending consolidation entry (Electra)
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct PendingConsolidation {
    pub source_index: u64,
    pub target_index: u64,
}

/// Historical summary
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct HistoricalSummary {
    pub block_summary_root: [u8; 32],
    pub state_summary_root: [u8; 32],
}

/// Sync committee (Altair+)
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct SyncCommittee {
    pub pubkeys: Vector<Vector<u8, 48>, 512>, // SYNC_COMMITTEE_SIZE
    pub aggregate_pubkey: Vector<u8, 48>,
}

/// Execution payload header (Deneb+)
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct ExecutionPayloadHeader {
    pub parent_hash: [u8; 32],
    pub fee_recipient: [u8; 20],
    pub state_root: [u8; 32],
    pub receipts_root: [u8; 32],
    pub logs_bloom: Vector<u8, 256>,
    pub prev_randao: [u8; 32],
    pub block_number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: List<u8, 32>,
    pub base_fee_per_gas: U256,
    pub block_hash: [u8; 32],
    pub transactions_root: [u8; 32],
    pub withdrawals_root: [u8; 32],
    pub blob_gas_used: u64,
    pub excess_blob_gas: u64,
}

const SLOTS_PER_HISTORICAL_ROOT: usize = 8192;
const HISTORICAL_ROOTS_LIMIT: usize = 16_777_216;
const EPOCHS_PER_ETH1_VOTING_PERIOD_SLOTS: usize = 2048;
const EPOCHS_PER_HISTORICAL_VECTOR: usize = 65_536;
const EPOCHS_PER_SLASHINGS_VECTOR: usize = 8192;
const PENDING_DEPOSITS_LIMIT: usize = 134_217_728;
const PENDING_PARTIAL_WITHDRAWALS_LIMIT: usize = 134_217_728;
const PENDING_CONSOLIDATIONS_LIMIT: usize = 262_144;
const PROPOSER_LOOKAHEAD_SIZE: usize = 64;

/// Electra BeaconState, mainnet limits
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct ElectraBeaconState {
    pub genesis_time: u64,
    pub genesis_validators_root: [u8; 32],
    pub slot: u64,
    pub fork: Fork,
    pub latest_block_header: BeaconBlockHeader,
    pub block_roots: Vector<[u8; 32], SLOTS_PER_HISTORICAL_ROOT>,
    pub state_roots: Vector<[u8; 32], SLOTS_PER_HISTORICAL_ROOT>,
    pub historical_roots: List<[u8; 32], HISTORICAL_ROOTS_LIMIT>,
    pub eth1_data: Eth1Data,
    pub eth1_data_votes: List<Eth1Data, EPOCHS_PER_ETH1_VOTING_PERIOD_SLOTS>,
    pub eth1_deposit_index: u64,
    // Field 11
    pub validators: List<Validator, { preset::VALIDATOR_REGISTRY_LIMIT }>,
    // Field 12
    pub balances: List<u64, { preset::VALIDATOR_REGISTRY_LIMIT }>,
    pub randao_mixes: Vector<[u8; 32], EPOCHS_PER_HISTORICAL_VECTOR>,
    pub slashings: Vector<u64, EPOCHS_PER_SLASHINGS_VECTOR>,
    pub previous_epoch_participation: List<u8, { preset::VALIDATOR_REGISTRY_LIMIT }>,
    pub current_epoch_participation: List<u8, { preset::VALIDATOR_REGISTRY_LIMIT }>,
    pub justification_bits: Bitvector<4>,
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    pub inactivity_scores: List<u64, { preset::VALIDATOR_REGISTRY_LIMIT }>,
    pub current_sync_committee: SyncCommittee,
    pub next_sync_committee: SyncCommittee,
    pub latest_execution_payload_header: ExecutionPayloadHeader,
    pub next_withdrawal_index: u64,
    pub next_withdrawal_validator_index: u64,
    pub historical_summaries: List<HistoricalSummary, HISTORICAL_ROOTS_LIMIT>,
    pub deposit_requests_start_index: u64,
    pub deposit_balance_to_consume: u64,
    pub exit_balance_to_consume: u64,
    pub earliest_exit_epoch: u64,
    pub consolidation_balance_to_consume: u64,
    pub earliest_consolidation_epoch: u64,
    pub pending_deposits: List<PendingDeposit, PENDING_DEPOSITS_LIMIT>,
    pub pending_partial_withdrawals:
        List<PendingPartialWithdrawal, PENDING_PARTIAL_WITHDRAWALS_LIMIT>,
    pub pending_consolidations: List<PendingConsolidation, PENDING_CONSOLIDATIONS_LIMIT>,
}

/// Fulu BeaconState: Electra plus the proposer lookahead (field 37)
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct FuluBeaconState {
    pub genesis_time: u64,
    pub genesis_validators_root: [u8; 32],
    pub slot: u64,
    pub fork: Fork,
    pub latest_block_header: BeaconBlockHeader,
    pub block_roots: Vector<[u8; 32], SLOTS_PER_HISTORICAL_ROOT>,
    pub state_roots: Vector<[u8; 32], SLOTS_PER_HISTORICAL_ROOT>,
    pub historical_roots: List<[u8; 32], HISTORICAL_ROOTS_LIMIT>,
    pub eth1_data: Eth1Data,
    pub eth1_data_votes: List<Eth1Data, EPOCHS_PER_ETH1_VOTING_PERIOD_SLOTS>,
    pub eth1_deposit_index: u64,
    pub validators: List<Validator, { preset::VALIDATOR_REGISTRY_LIMIT }>,
    pub balances: List<u64, { preset::VALIDATOR_REGISTRY_LIMIT }>,
    pub randao_mixes: Vector<[u8; 32], EPOCHS_PER_HISTORICAL_VECTOR>,
    pub slashings: Vector<u64, EPOCHS_PER_SLASHINGS_VECTOR>,
    pub previous_epoch_participation: List<u8, { preset::VALIDATOR_REGISTRY_LIMIT }>,
    pub current_epoch_participation: List<u8, { preset::VALIDATOR_REGISTRY_LIMIT }>,
    pub justification_bits: Bitvector<4>,
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    pub inactivity_scores: List<u64, { preset::VALIDATOR_REGISTRY_LIMIT }>,
    pub current_sync_committee: SyncCommittee,
    pub next_sync_committee: SyncCommittee,
    pub latest_execution_payload_header: ExecutionPayloadHeader,
    pub next_withdrawal_index: u64,
    pub next_withdrawal_validator_index: u64,
    pub historical_summaries: List<HistoricalSummary, HISTORICAL_ROOTS_LIMIT>,
    pub deposit_requests_start_index: u64,
    pub deposit_balance_to_consume: u64,
    pub exit_balance_to_consume: u64,
    pub earliest_exit_epoch: u64,
    pub consolidation_balance_to_consume: u64,
    pub earliest_consolidation_epoch: u64,
    pub pending_deposits: List<PendingDeposit, PENDING_DEPOSITS_LIMIT>,
    pub pending_partial_withdrawals:
        List<PendingPartialWithdrawal, PENDING_PARTIAL_WITHDRAWALS_LIMIT>,
    pub pending_consolidations: List<PendingConsolidation, PENDING_CONSOLIDATIONS_LIMIT>,
    pub proposer_lookahead: Vector<u64, PROPOSER_LOOKAHEAD_SIZE>,
}

/// Read access to the parts of a beacon state a snapshot is built from.
///
/// `validators` and `balances` are the only lists large enough to need the
/// sparse tree, so their roots are supplied by the caller instead of being
/// recomputed by `ssz_rs`.
pub trait BeaconStateFields {
    const LAYOUT: StateLayout;

    fn genesis_time(&self) -> u64;
    fn slot(&self) -> u64;
    fn validators(&self) -> &[Validator];
    fn balances(&self) -> &[u64];

    /// Roots of every top-level field in declaration order.
    ///
    /// # Errors
    /// Fails if `ssz_rs` cannot merkleize one of the other fields.
    fn field_roots(
        &self,
        validators_root: [u8; 32],
        balances_root: [u8; 32],
    ) -> Result<Vec<[u8; 32]>, MerkleizationError>;
}

fn root<T: HashTreeRoot>(value: &T) -> Result<[u8; 32], MerkleizationError> {
    Ok(value.hash_tree_root()?.into())
}

/// Field roots shared by every state with the Electra field order
macro_rules! electra_field_roots {
    ($state:expr, $validators_root:expr, $balances_root:expr) => {
        vec![
            root(&$state.genesis_time)?,
            root(&$state.genesis_validators_root)?,
            root(&$state.slot)?,
            root(&$state.fork)?,
            root(&$state.latest_block_header)?,
            root(&$state.block_roots)?,
            root(&$state.state_roots)?,
            root(&$state.historical_roots)?,
            root(&$state.eth1_data)?,
            root(&$state.eth1_data_votes)?,
            root(&$state.eth1_deposit_index)?,
            $validators_root,
            $balances_root,
            root(&$state.randao_mixes)?,
            root(&$state.slashings)?,
            root(&$state.previous_epoch_participation)?,
            root(&$state.current_epoch_participation)?,
            root(&$state.justification_bits)?,
            root(&$state.previous_justified_checkpoint)?,
            root(&$state.current_justified_checkpoint)?,
            root(&$state.finalized_checkpoint)?,
            root(&$state.inactivity_scores)?,
            root(&$state.current_sync_committee)?,
            root(&$state.next_sync_committee)?,
            root(&$state.latest_execution_payload_header)?,
            root(&$state.next_withdrawal_index)?,
            root(&$state.next_withdrawal_validator_index)?,
            root(&$state.historical_summaries)?,
            root(&$state.deposit_requests_start_index)?,
            root(&$state.deposit_balance_to_consume)?,
            root(&$state.exit_balance_to_consume)?,
            root(&$state.earliest_exit_epoch)?,
            root(&$state.consolidation_balance_to_consume)?,
            root(&$state.earliest_consolidation_epoch)?,
            root(&$state.pending_deposits)?,
            root(&$state.pending_partial_withdrawals)?,
            root(&$state.pending_consolidations)?,
        ]
    };
}

macro_rules! impl_state_accessors {
    () => {
        fn genesis_time(&self) -> u64 {
            self.genesis_time
        }

        fn slot(&self) -> u64 {
            self.slot
        }

        fn validators(&self) -> &[Validator] {
            &self.validators
        }

        fn balances(&self) -> &[u64] {
            &self.balances
        }
    };
}

impl BeaconStateFields for ElectraBeaconState {
    const LAYOUT: StateLayout = StateLayout::ELECTRA;

    impl_state_accessors!();

    fn field_roots(
        &self,
        validators_root: [u8; 32],
        balances_root: [u8; 32],
    ) -> Result<Vec<[u8; 32]>, MerkleizationError> {
        Ok(electra_field_roots!(self, validators_root, balances_root))
    }
}

impl BeaconStateFields for FuluBeaconState {
    const LAYOUT: StateLayout = StateLayout::FULU;

    impl_state_accessors!();

    fn field_roots(
        &self,
        validators_root: [u8; 32],
        balances_root: [u8; 32],
    ) -> Result<Vec<[u8; 32]>, MerkleizationError> {
        let mut roots = electra_field_roots!(self, validators_root, balances_root);
        roots.push(root(&self.proposer_lookahead)?);
        Ok(roots)
    }
}

/// Errors decoding a state served by the beacon node
#[derive(Error, Debug)]
pub enum StateDecodeError {
    #[error("Unsupported fork: {0}")]
    UnsupportedFork(String),

    #[error("SSZ decoding failed: {0}")]
    Ssz(String),
}

/// A decoded beacon state of any supported fork
#[derive(Debug, Clone)]
pub enum BeaconState {
    Electra(Box<ElectraBeaconState>),
    Fulu(Box<FuluBeaconState>),
}

impl BeaconState {
    /// Decode SSZ bytes for the fork named by the `Eth-Consensus-Version` header.
    ///
    /// # Errors
    /// Fails for forks before Electra and for malformed bytes.
    pub fn decode(fork: &str, bytes: &[u8]) -> Result<Self, StateDecodeError> {
        match fork.to_ascii_lowercase().as_str() {
            "electra" => ssz_rs::deserialize::<ElectraBeaconState>(bytes)
                .map(|state| Self::Electra(Box::new(state)))
                .map_err(|e| StateDecodeError::Ssz(e.to_string())),
            "fulu" => ssz_rs::deserialize::<FuluBeaconState>(bytes)
                .map(|state| Self::Fulu(Box::new(state)))
                .map_err(|e| StateDecodeError::Ssz(e.to_string())),
            other => Err(StateDecodeError::UnsupportedFork(other.to_string())),
        }
    }

    #[must_use]
    pub fn fork_name(&self) -> &'static str {
        match self {
            Self::Electra(_) => "electra",
            Self::Fulu(_) => "fulu",
        }
    }

    /// Build the proof-ready snapshot for the block whose header is `header`.
    ///
    /// # Errors
    /// Fails if the state does not hash to `header.state_root`.
    pub fn into_snapshot(
        self,
        header: BeaconBlockHeader,
    ) -> Result<BeaconStateSnapshot, SnapshotError> {
        match self {
            Self::Electra(state) => BeaconStateSnapshot::from_state(header, state.as_ref()),
            Self::Fulu(state) => BeaconStateSnapshot::from_state(header, state.as_ref()),
        }
    }
}

// ============================================================================
// Test BeaconState - Small limits for in-memory reference proofs
// ============================================================================

/// Validator limit for test state: 2^10 = 1024
#[cfg(any(test, feature = "testing"))]
pub const TEST_VALIDATOR_LIMIT: usize = 1024;

/// Electra-shaped BeaconState with small limits
///
/// **Important**: proof lengths from this state differ from mainnet:
/// - Validators tree depth: 10 (vs 40 on mainnet)
/// - Balances tree depth: 8 (vs 38 on mainnet)
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct MinimalBeaconState {
    pub genesis_time: u64,
    pub genesis_validators_root: [u8; 32],
    pub slot: u64,
    pub fork: Fork,
    pub latest_block_header: BeaconBlockHeader,
    pub block_roots: Vector<[u8; 32], 64>,
    pub state_roots: Vector<[u8; 32], 64>,
    pub historical_roots: List<[u8; 32], 1024>,
    pub eth1_data: Eth1Data,
    pub eth1_data_votes: List<Eth1Data, 32>,
    pub eth1_deposit_index: u64,
    pub validators: List<Validator, TEST_VALIDATOR_LIMIT>,
    pub balances: List<u64, TEST_VALIDATOR_LIMIT>,
    pub randao_mixes: Vector<[u8; 32], 64>,
    pub slashings: Vector<u64, 64>,
    pub previous_epoch_participation: List<u8, TEST_VALIDATOR_LIMIT>,
    pub current_epoch_participation: List<u8, TEST_VALIDATOR_LIMIT>,
    pub justification_bits: Bitvector<4>,
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    pub inactivity_scores: List<u64, TEST_VALIDATOR_LIMIT>,
    pub current_sync_committee: SyncCommittee,
    pub next_sync_committee: SyncCommittee,
    pub latest_execution_payload_header: ExecutionPayloadHeader,
    pub next_withdrawal_index: u64,
    pub next_withdrawal_validator_index: u64,
    pub historical_summaries: List<HistoricalSummary, 1024>,
    pub deposit_requests_start_index: u64,
    pub deposit_balance_to_consume: u64,
    pub exit_balance_to_consume: u64,
    pub earliest_exit_epoch: u64,
    pub consolidation_balance_to_consume: u64,
    pub earliest_consolidation_epoch: u64,
    pub pending_deposits: List<PendingDeposit, 256>,
    pub pending_partial_withdrawals: List<PendingPartialWithdrawal, 256>,
    pub pending_consolidations: List<PendingConsolidation, 64>,
}

#[cfg(any(test, feature = "testing"))]
impl MinimalBeaconState {
    pub const LAYOUT: StateLayout = StateLayout {
        field_count: 37,
        validators_tree_depth: 10,
        balances_tree_depth: 8,
    };
}

#[cfg(any(test, feature = "testing"))]
impl BeaconStateFields for MinimalBeaconState {
    const LAYOUT: StateLayout = MinimalBeaconState::LAYOUT;

    impl_state_accessors!();

    fn field_roots(
        &self,
        validators_root: [u8; 32],
        balances_root: [u8; 32],
    ) -> Result<Vec<[u8; 32]>, MerkleizationError> {
        Ok(electra_field_roots!(self, validators_root, balances_root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_unknown_fork() {
        assert!(matches!(
            BeaconState::decode("deneb", &[]),
            Err(StateDecodeError::UnsupportedFork(fork)) if fork == "deneb"
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_bytes() {
        assert!(matches!(
            BeaconState::decode("Electra", &[0u8; 16]),
            Err(StateDecodeError::Ssz(_))
        ));
    }

    #[test]
    fn test_minimal_field_roots_rebuild_state_root() {
        let mut state = MinimalBeaconState {
            genesis_time: 1_606_824_023,
            slot: 77,
            ..Default::default()
        };
        state.validators.push(Validator {
            effective_balance: 32_000_000_000,
            ..Default::default()
        });
        state.balances.push(32_000_000_123);

        let validators_root = root(&state.validators).unwrap();
        let balances_root = root(&state.balances).unwrap();
        let roots = state.field_roots(validators_root, balances_root).unwrap();
        assert_eq!(roots.len(), MinimalBeaconState::LAYOUT.field_count);

        let tree = crate::merkle::MerkleTree::from_chunks(roots, 6).unwrap();
        assert_eq!(tree.root(), root(&state).unwrap());
    }
}
