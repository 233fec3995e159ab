//! Synthetic beacon states for tests.
//!
//! Builds [`MinimalBeaconState`]s (small list limits) together with the
//! snapshot of a block committing to them, so proofs can be checked against
//! `ssz_rs` and fed to the higher layers without a beacon node.

use crate::beacon_state::MinimalBeaconState;
use crate::snapshot::{BeaconStateSnapshot, SnapshotError};
use crate::types::{preset, BeaconBlockHeader, Validator};
use ssz_rs::prelude::*;

pub const TEST_GENESIS_TIME: u64 = 1_606_824_023;

/// Address no test pod uses
pub const FOREIGN_ADDRESS: [u8; 20] = [0xee; 20];

const MAX_EFFECTIVE_BALANCE: u64 = 32_000_000_000;

/// An active validator with `0x01` credentials for `withdrawal_address`
#[must_use]
pub fn validator(seed: u64, withdrawal_address: &[u8; 20]) -> Validator {
    let mut pubkey = vec![0xa5; 48];
    pubkey[..8].copy_from_slice(&seed.to_be_bytes());

    let mut withdrawal_credentials = [0u8; 32];
    withdrawal_credentials[0] = preset::ETH1_ADDRESS_WITHDRAWAL_PREFIX;
    withdrawal_credentials[12..].copy_from_slice(withdrawal_address);

    Validator {
        pubkey: Vector::try_from(pubkey).unwrap_or_default(),
        withdrawal_credentials,
        effective_balance: MAX_EFFECTIVE_BALANCE,
        slashed: false,
        activation_eligibility_epoch: 0,
        activation_epoch: 0,
        exit_epoch: preset::FAR_FUTURE_EPOCH,
        withdrawable_epoch: preset::FAR_FUTURE_EPOCH,
    }
}

/// `count` validators withdrawing to [`FOREIGN_ADDRESS`]
#[must_use]
pub fn sample_validators(count: u64) -> Vec<Validator> {
    (0..count).map(|seed| validator(seed, &FOREIGN_ADDRESS)).collect()
}

/// Builder for a synthetic state and its snapshot
#[derive(Debug, Clone, Default)]
pub struct SyntheticState {
    validators: Vec<Validator>,
    balances: Vec<u64>,
    slot: u64,
}

impl SyntheticState {
    #[must_use]
    pub fn new(slot: u64) -> Self {
        Self {
            slot,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Validator, balance_gwei: u64) -> Self {
        self.validators.push(validator);
        self.balances.push(balance_gwei);
        self
    }

    /// Build the state and the snapshot of a block committing to it.
    ///
    /// # Errors
    /// Fails if the state cannot be merkleized.
    pub fn build(&self) -> Result<(MinimalBeaconState, BeaconStateSnapshot), SnapshotError> {
        let mut state = MinimalBeaconState {
            genesis_time: TEST_GENESIS_TIME,
            slot: self.slot,
            ..Default::default()
        };
        for validator in &self.validators {
            state.validators.push(validator.clone());
        }
        for balance in &self.balances {
            state.balances.push(*balance);
        }

        let state_root: [u8; 32] = state.hash_tree_root()?.into();
        let header = BeaconBlockHeader {
            slot: self.slot,
            proposer_index: 0,
            parent_root: [0x01; 32],
            state_root,
            body_root: [0x02; 32],
        };
        let snapshot = BeaconStateSnapshot::from_state(header, &state)?;
        Ok((state, snapshot))
    }
}

/// Snapshot over `validators`, each with a distinct balance near 32 ETH.
///
/// # Errors
/// Fails if the state cannot be merkleized.
pub fn synthetic_snapshot(
    validators: &[Validator],
    slot: u64,
) -> Result<(MinimalBeaconState, BeaconStateSnapshot), SnapshotError> {
    validators
        .iter()
        .zip(0u64..)
        .fold(SyntheticState::new(slot), |builder, (validator, index)| {
            builder.with_validator(validator.clone(), validator.effective_balance + index * 1_000)
        })
        .build()
}
