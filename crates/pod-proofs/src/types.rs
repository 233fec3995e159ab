//! Beacon Chain and Pod Types
//!
//! SSZ containers shared by every beacon state fork, plus the pod-side view of
//! a validator that joins the beacon record with the EigenPod contract's
//! bookkeeping.

use crate::merkle::{pad_leaf, uint64_chunk};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use ssz_rs::prelude::*;
use std::fmt;

/// Mainnet preset constants
pub mod preset {
    /// Maximum number of validators (2^40)
    pub const VALIDATOR_REGISTRY_LIMIT: usize = 1_099_511_627_776;
    /// Seconds per slot
    pub const SECONDS_PER_SLOT: u64 = 12;
    /// Slots per epoch
    pub const SLOTS_PER_EPOCH: u64 = 32;
    /// Epoch value of a validator that has not been scheduled
    pub const FAR_FUTURE_EPOCH: u64 = u64::MAX;
    /// Withdrawal credential prefix for an execution-layer address
    pub const ETH1_ADDRESS_WITHDRAWAL_PREFIX: u8 = 0x01;
}

/// Shape of the beacon state tree a snapshot was taken from.
///
/// The mainnet layouts carry the real list limits. Tests use small-limit
/// layouts so `ssz_rs` can prove against them directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateLayout {
    /// Number of top-level `BeaconState` fields
    pub field_count: usize,
    /// Depth of the `validators` list data tree
    pub validators_tree_depth: u32,
    /// Depth of the `balances` list data tree (four balances per chunk)
    pub balances_tree_depth: u32,
}

impl StateLayout {
    pub const ELECTRA: Self = Self {
        field_count: 37,
        validators_tree_depth: 40,
        balances_tree_depth: 38,
    };

    pub const FULU: Self = Self {
        field_count: 38,
        validators_tree_depth: 40,
        balances_tree_depth: 38,
    };

    /// Depth of the tree over the state's field roots
    #[must_use]
    pub fn state_tree_depth(&self) -> u32 {
        self.field_count.next_power_of_two().trailing_zeros()
    }
}

/// Validator record from the beacon state
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct Validator {
    /// BLS public key (48 bytes)
    pub pubkey: Vector<u8, 48>,
    /// Withdrawal credentials (32 bytes)
    pub withdrawal_credentials: [u8; 32],
    /// Effective balance in Gwei
    pub effective_balance: u64,
    /// Whether the validator is slashed
    pub slashed: bool,
    /// Epoch when validator became eligible for activation
    pub activation_eligibility_epoch: u64,
    /// Epoch when validator was activated
    pub activation_epoch: u64,
    /// Epoch when validator will exit
    pub exit_epoch: u64,
    /// Epoch when validator can withdraw
    pub withdrawable_epoch: u64,
}

impl Validator {
    /// The eight field chunks whose Merkle root is the validator's root.
    ///
    /// `pubkey` is a 48-byte vector, so its chunk is the pubkey hash.
    #[must_use]
    pub fn field_chunks(&self) -> [[u8; 32]; 8] {
        [
            self.pubkey_hash(),
            self.withdrawal_credentials,
            uint64_chunk(self.effective_balance),
            pad_leaf(&[u8::from(self.slashed)]).unwrap_or_default(),
            uint64_chunk(self.activation_eligibility_epoch),
            uint64_chunk(self.activation_epoch),
            uint64_chunk(self.exit_epoch),
            uint64_chunk(self.withdrawable_epoch),
        ]
    }

    /// `sha256(pubkey ‖ 16 zero bytes)`, the key the pod contract indexes validators by
    #[must_use]
    pub fn pubkey_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(&self.pubkey[..]);
        hasher.update([0u8; 16]);
        hasher.finalize().into()
    }

    /// Whether the withdrawal credentials are `0x01` credentials for `address`
    #[must_use]
    pub fn withdraws_to(&self, address: &[u8; 20]) -> bool {
        self.withdrawal_credentials[0] == preset::ETH1_ADDRESS_WITHDRAWAL_PREFIX
            && &self.withdrawal_credentials[12..] == address
    }
}

/// Beacon block header
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct BeaconBlockHeader {
    /// Slot number
    pub slot: u64,
    /// Proposer validator index
    pub proposer_index: u64,
    /// Root of the parent block
    pub parent_root: [u8; 32],
    /// Root of the beacon state
    pub state_root: [u8; 32],
    /// Root of the block body
    pub body_root: [u8; 32],
}

impl BeaconBlockHeader {
    /// Field chunks in declaration order
    #[must_use]
    pub fn field_chunks(&self) -> Vec<[u8; 32]> {
        vec![
            uint64_chunk(self.slot),
            uint64_chunk(self.proposer_index),
            self.parent_root,
            self.state_root,
            self.body_root,
        ]
    }
}

/// A beacon validator together with its registry index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorWithIndex {
    pub index: u64,
    pub validator: Validator,
}

/// Pod-side status of a validator, as recorded by the EigenPod contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorStatus {
    /// Withdrawal credentials not yet proven
    Inactive,
    Active,
    Withdrawn,
}

impl ValidatorStatus {
    /// Decode the contract's `VALIDATOR_STATUS` enum value
    #[must_use]
    pub fn from_onchain(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Inactive),
            1 => Some(Self::Active),
            2 => Some(Self::Withdrawn),
            _ => None,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Withdrawn => "withdrawn",
        }
    }
}

impl fmt::Display for ValidatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Join of a beacon validator with the pod contract's view of it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodValidator {
    pub index: u64,
    pub validator: Validator,
    pub status: ValidatorStatus,
    /// Current beacon balance
    pub balance_gwei: u64,
    /// Balance last credited by the pod
    pub restaked_balance_gwei: u64,
    /// Timestamp of the last checkpoint that included this validator
    pub last_checkpointed_at: u64,
}

// Hex encoding helpers for serde
pub(crate) mod hex_bytes32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}

pub(crate) mod hex_bytes32_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(items: &[[u8; 32]], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let hex_strings: Vec<String> = items
            .iter()
            .map(|b| format!("0x{}", hex::encode(b)))
            .collect();
        serializer.collect_seq(hex_strings)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<[u8; 32]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex_strings: Vec<String> = Vec::deserialize(deserializer)?;
        hex_strings
            .into_iter()
            .map(|s| {
                let s = s.strip_prefix("0x").unwrap_or(&s);
                let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
                bytes
                    .try_into()
                    .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
            })
            .collect()
    }
}

/// `0x`-prefixed hex for variable-length byte strings
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
    }
}
