//! EigenPod Contract Access
//!
//! The execution-layer seams of the prover: [`ExecutionClient`] for chain
//! reads and transaction sending, [`PodContract`] for the pod's own state.
//! Both are implemented over an `alloy` HTTP provider. Call data for the three
//! pod transactions is built by pure encoders so it can be printed instead of
//! sent.

use crate::config::Signer;
use alloy::{
    eips::BlockNumberOrTag,
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, Bytes, FixedBytes, Uint, B256, U256},
    providers::{DynProvider, PendingTransactionError, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    sol,
    sol_types::SolCall,
    transports::TransportError,
};
use async_trait::async_trait;
use pod_proofs::proof::{BalanceContainerProof, BalanceProof, StateRootProof, ValidatorFieldsProof};
use pod_proofs::{Checkpoint, ValidatorStatus};
use reqwest::Url;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

const WEI_PER_GWEI: u64 = 1_000_000_000;

// Generate contract bindings from ABI
sol! {
    #[sol(rpc)]
    interface IEigenPod {
        struct Checkpoint {
            bytes32 beaconBlockRoot;
            uint24 proofsRemaining;
            uint64 podBalanceGwei;
            int64 balanceDeltasGwei;
            uint64 prevBeaconBalanceGwei;
        }

        struct ValidatorInfo {
            uint64 validatorIndex;
            uint64 restakedBalanceGwei;
            uint64 lastCheckpointedAt;
            uint8 status;
        }

        struct StateRootProof {
            bytes32 beaconStateRoot;
            bytes proof;
        }

        struct BalanceContainerProof {
            bytes32 balanceContainerRoot;
            bytes proof;
        }

        struct BalanceProof {
            bytes32 pubkeyHash;
            bytes32 balanceRoot;
            bytes proof;
        }

        function currentCheckpointTimestamp() external view returns (uint64);
        function currentCheckpoint() external view returns (Checkpoint memory);
        function validatorPubkeyHashToInfo(bytes32 validatorPubkeyHash) external view returns (ValidatorInfo memory);
        function withdrawableRestakedExecutionLayerGwei() external view returns (uint64);
        function podOwner() external view returns (address);
        function eigenPodManager() external view returns (address);

        function startCheckpoint(bool revertIfNoBalance) external;
        function verifyCheckpointProofs(
            BalanceContainerProof calldata balanceContainerProof,
            BalanceProof[] calldata proofs
        ) external;
        function verifyWithdrawalCredentials(
            uint64 beaconTimestamp,
            StateRootProof calldata stateRootProof,
            uint40[] calldata validatorIndices,
            bytes[] calldata validatorFieldsProofs,
            bytes32[][] calldata validatorFields
        ) external;
    }

    #[sol(rpc)]
    interface IEigenPodManager {
        function podOwnerDepositShares(address podOwner) external view returns (int256);
    }
}

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("RPC request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Contract call failed: {0}")]
    Call(#[from] alloy::contract::Error),

    #[error("Waiting for receipt failed: {0}")]
    Receipt(#[from] PendingTransactionError),

    #[error("Transaction {0} reverted")]
    Reverted(B256),

    #[error("Latest block not found")]
    MissingBlock,

    #[error("Block {0} has no parent beacon block root")]
    MissingBeaconRoot(u64),

    #[error("Unexpected contract value: {0}")]
    InvalidValue(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// A transaction to the pod, unsigned
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallData {
    pub to: Address,
    pub data: Bytes,
}

/// Execution block fields the prover needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub number: u64,
    pub timestamp: u64,
    /// EIP-4788 root of the beacon block this block builds on
    pub parent_beacon_block_root: [u8; 32],
}

/// The pod's record of one validator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorInfo {
    pub validator_index: u64,
    pub restaked_balance_gwei: u64,
    pub last_checkpointed_at: u64,
    pub status: ValidatorStatus,
}

#[async_trait]
pub trait ExecutionClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ContractError>;

    async fn latest_block(&self) -> Result<BlockInfo, ContractError>;

    async fn balance_gwei(&self, address: Address) -> Result<u64, ContractError>;

    /// Sign and send `call`, then wait for `confirmations` if non-zero.
    ///
    /// # Errors
    /// Fails if sending fails or the confirmed transaction reverted.
    async fn send_transaction(
        &self,
        call: &CallData,
        signer: &Signer,
        confirmations: u64,
    ) -> Result<B256, ContractError>;
}

#[async_trait]
pub trait PodContract: Send + Sync {
    fn address(&self) -> Address;

    /// The active checkpoint, `None` if no checkpoint is in progress
    async fn current_checkpoint(&self) -> Result<Option<Checkpoint>, ContractError>;

    async fn validator_info(&self, pubkey_hash: [u8; 32]) -> Result<ValidatorInfo, ContractError>;

    async fn withdrawable_restaked_gwei(&self) -> Result<u64, ContractError>;

    /// Pod owner's deposit shares in gwei; negative while in deficit
    async fn pod_owner_shares_gwei(&self) -> Result<i128, ContractError>;
}

/// `startCheckpoint(revertIfNoBalance)`
#[must_use]
pub fn start_checkpoint_call(pod: Address, revert_if_no_balance: bool) -> CallData {
    let call = IEigenPod::startCheckpointCall {
        revertIfNoBalance: revert_if_no_balance,
    };
    CallData {
        to: pod,
        data: call.abi_encode().into(),
    }
}

/// `verifyCheckpointProofs` for one batch of balance proofs
#[must_use]
pub fn verify_checkpoint_proofs_call(
    pod: Address,
    container: &BalanceContainerProof,
    proofs: &[BalanceProof],
) -> CallData {
    let call = IEigenPod::verifyCheckpointProofsCall {
        balanceContainerProof: IEigenPod::BalanceContainerProof {
            balanceContainerRoot: FixedBytes(container.balance_container_root),
            proof: container.proof.path_bytes().into(),
        },
        proofs: proofs
            .iter()
            .map(|p| IEigenPod::BalanceProof {
                pubkeyHash: FixedBytes(p.pubkey_hash),
                balanceRoot: FixedBytes(p.balance_root),
                proof: p.proof.path_bytes().into(),
            })
            .collect(),
    };
    CallData {
        to: pod,
        data: call.abi_encode().into(),
    }
}

/// `verifyWithdrawalCredentials` for one batch of validator fields proofs
///
/// # Errors
/// Fails if a validator index does not fit the contract's `uint40`.
pub fn verify_withdrawal_credentials_call(
    pod: Address,
    beacon_timestamp: u64,
    state_root_proof: &StateRootProof,
    proofs: &[ValidatorFieldsProof],
) -> Result<CallData, ContractError> {
    let validator_indices = proofs
        .iter()
        .map(|p| {
            Uint::<40, 1>::try_from(p.validator_index).map_err(|_| {
                ContractError::InvalidValue(format!(
                    "validator index {} exceeds uint40",
                    p.validator_index
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let call = IEigenPod::verifyWithdrawalCredentialsCall {
        beaconTimestamp: beacon_timestamp,
        stateRootProof: IEigenPod::StateRootProof {
            beaconStateRoot: FixedBytes(state_root_proof.beacon_state_root),
            proof: state_root_proof.proof.path_bytes().into(),
        },
        validatorIndices: validator_indices,
        validatorFieldsProofs: proofs
            .iter()
            .map(|p| p.proof.path_bytes().into())
            .collect(),
        validatorFields: proofs
            .iter()
            .map(|p| p.fields.iter().copied().map(FixedBytes).collect())
            .collect(),
    };
    Ok(CallData {
        to: pod,
        data: call.abi_encode().into(),
    })
}

/// JSON-RPC execution client
#[derive(Debug, Clone)]
pub struct RpcClient {
    rpc_url: Url,
    provider: DynProvider,
}

impl RpcClient {
    #[must_use]
    pub fn new(rpc_url: Url) -> Self {
        let provider = ProviderBuilder::new().connect_http(rpc_url.clone()).erased();
        Self { rpc_url, provider }
    }

    /// Read-only provider for contract calls
    #[must_use]
    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }
}

#[async_trait]
impl ExecutionClient for RpcClient {
    async fn chain_id(&self) -> Result<u64, ContractError> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn latest_block(&self) -> Result<BlockInfo, ContractError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await?
            .ok_or(ContractError::MissingBlock)?;
        let number = block.header.number;
        let root = block
            .header
            .parent_beacon_block_root
            .ok_or(ContractError::MissingBeaconRoot(number))?;

        Ok(BlockInfo {
            number,
            timestamp: block.header.timestamp,
            parent_beacon_block_root: root.0,
        })
    }

    async fn balance_gwei(&self, address: Address) -> Result<u64, ContractError> {
        let wei = self.provider.get_balance(address).await?;
        u64::try_from(wei / U256::from(WEI_PER_GWEI))
            .map_err(|_| ContractError::InvalidValue(format!("balance {wei} wei")))
    }

    #[instrument(skip_all, fields(to = %call.to))]
    async fn send_transaction(
        &self,
        call: &CallData,
        signer: &Signer,
        confirmations: u64,
    ) -> Result<B256, ContractError> {
        // Build provider with wallet
        let wallet = EthereumWallet::from(signer.inner().clone());
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(self.rpc_url.clone());

        let tx = TransactionRequest::default()
            .with_to(call.to)
            .with_input(call.data.clone());
        let pending_tx = provider.send_transaction(tx).await?;
        let tx_hash = *pending_tx.tx_hash();
        info!(tx_hash = %tx_hash, "Transaction submitted");

        // Wait for confirmations if configured
        if confirmations > 0 {
            debug!(confirmations, "Waiting for confirmations");
            let receipt = pending_tx
                .with_required_confirmations(confirmations)
                .get_receipt()
                .await?;

            if !receipt.status() {
                return Err(ContractError::Reverted(tx_hash));
            }

            info!(
                tx_hash = %tx_hash,
                gas_used = receipt.gas_used,
                "Transaction confirmed"
            );
        }

        Ok(tx_hash)
    }
}

/// An EigenPod read through an RPC provider
#[derive(Debug, Clone)]
pub struct EigenPodContract {
    address: Address,
    provider: DynProvider,
}

impl EigenPodContract {
    #[must_use]
    pub fn new(address: Address, provider: DynProvider) -> Self {
        Self { address, provider }
    }
}

#[async_trait]
impl PodContract for EigenPodContract {
    fn address(&self) -> Address {
        self.address
    }

    #[instrument(skip(self))]
    async fn current_checkpoint(&self) -> Result<Option<Checkpoint>, ContractError> {
        let pod = IEigenPod::new(self.address, &self.provider);
        let started_at: u64 = pod.currentCheckpointTimestamp().call().await?;
        if started_at == 0 {
            return Ok(None);
        }

        let checkpoint = pod.currentCheckpoint().call().await?;
        let shares = self.pod_owner_shares_gwei().await?;
        Ok(Some(Checkpoint::new(
            started_at,
            checkpoint.beaconBlockRoot.0,
            checkpoint.proofsRemaining.to::<u64>(),
            checkpoint.podBalanceGwei,
            checkpoint.balanceDeltasGwei,
            shares,
        )))
    }

    async fn validator_info(&self, pubkey_hash: [u8; 32]) -> Result<ValidatorInfo, ContractError> {
        let pod = IEigenPod::new(self.address, &self.provider);
        let info = pod
            .validatorPubkeyHashToInfo(FixedBytes(pubkey_hash))
            .call()
            .await?;
        let status = ValidatorStatus::from_onchain(info.status).ok_or_else(|| {
            ContractError::InvalidValue(format!("validator status {}", info.status))
        })?;

        Ok(ValidatorInfo {
            validator_index: info.validatorIndex,
            restaked_balance_gwei: info.restakedBalanceGwei,
            last_checkpointed_at: info.lastCheckpointedAt,
            status,
        })
    }

    async fn withdrawable_restaked_gwei(&self) -> Result<u64, ContractError> {
        let pod = IEigenPod::new(self.address, &self.provider);
        Ok(pod.withdrawableRestakedExecutionLayerGwei().call().await?)
    }

    async fn pod_owner_shares_gwei(&self) -> Result<i128, ContractError> {
        let pod = IEigenPod::new(self.address, &self.provider);
        let owner: Address = pod.podOwner().call().await?;
        let manager_address: Address = pod.eigenPodManager().call().await?;

        let manager = IEigenPodManager::new(manager_address, &self.provider);
        let shares_wei = manager.podOwnerDepositShares(owner).call().await?;
        let shares_wei = i128::try_from(shares_wei)
            .map_err(|_| ContractError::InvalidValue(format!("shares {shares_wei} wei")))?;
        Ok(shares_wei / i128::from(WEI_PER_GWEI))
    }
}
