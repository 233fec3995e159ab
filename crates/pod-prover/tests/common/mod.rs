//! In-memory fakes of the chain clients.

#![allow(dead_code)]

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use pod_proofs::testing::{validator, SyntheticState, FOREIGN_ADDRESS};
use pod_proofs::{
    BeaconApi, BeaconClientError, BeaconStateSnapshot, Checkpoint, StateId, ValidatorStatus,
};
use pod_prover::config::{parse_url, OutputOptions, ProverConfig, Signer};
use pod_prover::contract::{
    BlockInfo, CallData, ContractError, ExecutionClient, PodContract, ValidatorInfo,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

pub const POD: [u8; 20] = [0x42; 20];
pub const BLOCK_TIMESTAMP: u64 = 1_700_000_012;
pub const ANVIL_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub fn pod_address() -> Address {
    Address::from(POD)
}

pub fn config() -> ProverConfig {
    ProverConfig {
        pod_address: pod_address(),
        beacon_url: parse_url("beacon", "http://localhost:5052").unwrap(),
        rpc_url: parse_url("rpc", "http://localhost:8545").unwrap(),
        request_timeout: Duration::from_secs(5),
        tx_timeout: Duration::from_secs(5),
        beacon_retries: 0,
        proof_concurrency: 2,
        output: OutputOptions::default(),
    }
}

/// Five validators; those listed in `pod_indices` withdraw to [`POD`]
pub fn pod_snapshot(pod_indices: &[u64]) -> BeaconStateSnapshot {
    let builder = (0..5u64).fold(SyntheticState::new(8_000), |builder, seed| {
        let address = if pod_indices.contains(&seed) {
            POD
        } else {
            FOREIGN_ADDRESS
        };
        builder.with_validator(validator(seed, &address), 32_000_000_000 + seed * 1_000_000)
    });
    let (_, snapshot) = builder.build().unwrap();
    snapshot
}

/// Serves one snapshot by block root, or as head
pub struct FakeBeacon {
    pub snapshot: BeaconStateSnapshot,
}

#[async_trait]
impl BeaconApi for FakeBeacon {
    async fn fetch_snapshot(
        &self,
        state_id: &StateId,
    ) -> Result<BeaconStateSnapshot, BeaconClientError> {
        match state_id {
            StateId::Head => Ok(self.snapshot.clone()),
            StateId::BlockRoot(root) if *root == self.snapshot.block_root() => {
                Ok(self.snapshot.clone())
            }
            other => Err(BeaconClientError::NotFound(format!("Block {other}"))),
        }
    }
}

/// Records sent transactions; the `fail_at`-th send (zero-based) reverts
pub struct FakeExecution {
    pub block: BlockInfo,
    pub pod_balance_gwei: u64,
    pub fail_at: Option<usize>,
    pub sent: Mutex<Vec<CallData>>,
}

impl FakeExecution {
    pub fn new(parent_beacon_block_root: [u8; 32]) -> Self {
        Self {
            block: BlockInfo {
                number: 20_000_000,
                timestamp: BLOCK_TIMESTAMP,
                parent_beacon_block_root,
            },
            pod_balance_gwei: 0,
            fail_at: None,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<CallData> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionClient for FakeExecution {
    async fn chain_id(&self) -> Result<u64, ContractError> {
        Ok(1)
    }

    async fn latest_block(&self) -> Result<BlockInfo, ContractError> {
        Ok(self.block)
    }

    async fn balance_gwei(&self, _address: Address) -> Result<u64, ContractError> {
        Ok(self.pod_balance_gwei)
    }

    async fn send_transaction(
        &self,
        call: &CallData,
        _signer: &Signer,
        _confirmations: u64,
    ) -> Result<B256, ContractError> {
        let mut sent = self.sent.lock().unwrap();
        let n = sent.len();
        sent.push(call.clone());
        if self.fail_at == Some(n) {
            return Err(ContractError::Reverted(B256::repeat_byte(0xff)));
        }
        Ok(B256::repeat_byte(u8::try_from(n + 1).unwrap()))
    }
}

/// A pod whose validator records are keyed by pubkey hash
#[derive(Default)]
pub struct FakePod {
    pub infos: HashMap<[u8; 32], ValidatorInfo>,
    pub checkpoint: Option<Checkpoint>,
    pub withdrawable_gwei: u64,
    pub shares_gwei: i128,
}

impl FakePod {
    /// Record validator `index` of `snapshot` with `status`
    pub fn with_validator(
        mut self,
        snapshot: &BeaconStateSnapshot,
        index: u64,
        status: ValidatorStatus,
    ) -> Self {
        let validator = snapshot.validator(index).unwrap();
        let restaked = if status == ValidatorStatus::Active {
            validator.effective_balance
        } else {
            0
        };
        self.infos.insert(
            validator.pubkey_hash(),
            ValidatorInfo {
                validator_index: index,
                restaked_balance_gwei: restaked,
                last_checkpointed_at: 0,
                status,
            },
        );
        self
    }
}

#[async_trait]
impl PodContract for FakePod {
    fn address(&self) -> Address {
        pod_address()
    }

    async fn current_checkpoint(&self) -> Result<Option<Checkpoint>, ContractError> {
        Ok(self.checkpoint.clone())
    }

    async fn validator_info(&self, pubkey_hash: [u8; 32]) -> Result<ValidatorInfo, ContractError> {
        // unknown validators read as the contract's zero value
        Ok(self.infos.get(&pubkey_hash).copied().unwrap_or(ValidatorInfo {
            validator_index: 0,
            restaked_balance_gwei: 0,
            last_checkpointed_at: 0,
            status: ValidatorStatus::Inactive,
        }))
    }

    async fn withdrawable_restaked_gwei(&self) -> Result<u64, ContractError> {
        Ok(self.withdrawable_gwei)
    }

    async fn pod_owner_shares_gwei(&self) -> Result<i128, ContractError> {
        Ok(self.shares_gwei)
    }
}
