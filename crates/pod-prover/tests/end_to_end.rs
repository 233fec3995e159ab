//! Command flows against in-memory chain clients.

mod common;

use alloy::sol_types::SolCall;
use common::{
    config, pod_snapshot, FakeBeacon, FakeExecution, FakePod, ANVIL_KEY, BLOCK_TIMESTAMP,
};
use pod_proofs::{
    build_credential_proofs, Checkpoint, CheckpointError, ProofError, ProofWorkers,
    ValidatorStatus,
};
use pod_prover::commands::{checkpoint, credentials, status};
use pod_prover::config::{ConfigError, SubmitOptions};
use pod_prover::contract::IEigenPod;
use pod_prover::{CommandOutput, ProverContext, ProverError};
use tokio_util::sync::CancellationToken;

fn context<'a>(
    config: &'a pod_prover::ProverConfig,
    beacon: &'a FakeBeacon,
    execution: &'a FakeExecution,
    pod: &'a FakePod,
    workers: &'a ProofWorkers,
) -> ProverContext<'a> {
    ProverContext {
        config,
        beacon,
        execution,
        pod,
        workers,
        cancel: CancellationToken::new(),
    }
}

#[tokio::test]
async fn test_credentials_prove_only_unverified() {
    let snapshot = pod_snapshot(&[2, 4]);
    let pod = FakePod::default()
        .with_validator(&snapshot, 2, ValidatorStatus::Active)
        .with_validator(&snapshot, 4, ValidatorStatus::Inactive);
    let execution = FakeExecution::new(snapshot.block_root());
    let beacon = FakeBeacon {
        snapshot: snapshot.clone(),
    };
    let config = config();
    let workers = ProofWorkers::new(2).unwrap();
    let ctx = context(&config, &beacon, &execution, &pod, &workers);

    let options = SubmitOptions::new(false, None, 20, 1).unwrap();
    let output = credentials::run(&ctx, &options, None).await.unwrap();
    let CommandOutput::Proofs(document) = output else {
        panic!("expected a proof document, got {output:?}");
    };
    assert_eq!(document.beacon_timestamp, BLOCK_TIMESTAMP);
    assert_eq!(document.beacon_block_root, snapshot.block_root());
    assert!(document.state_root_proof.is_some());
    let indices: Vec<u64> = document.per_validator.iter().map(|v| v.index).collect();
    assert_eq!(indices, vec![4]);
    assert!(execution.sent().is_empty());

    let proofs = build_credential_proofs(&snapshot, &[4], &workers).unwrap();
    assert!(proofs.state_root_proof.proof.verify(&snapshot.block_root()));
    assert!(proofs.validator_proofs[0].proof.verify(&snapshot.state_root()));
}

#[tokio::test]
async fn test_credentials_simulated_call_data() {
    let snapshot = pod_snapshot(&[2, 4]);
    let pod = FakePod::default();
    let execution = FakeExecution::new(snapshot.block_root());
    let beacon = FakeBeacon { snapshot };
    let config = config();
    let workers = ProofWorkers::new(2).unwrap();
    let ctx = context(&config, &beacon, &execution, &pod, &workers);

    let options = SubmitOptions::new(true, None, 1, 1).unwrap();
    let output = credentials::run(&ctx, &options, None).await.unwrap();
    let CommandOutput::Simulated(transactions) = output else {
        panic!("expected simulated transactions, got {output:?}");
    };
    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[0].kind, "verifyWithdrawalCredentials");
    assert_eq!(transactions[1].validator_indices, vec![4]);
    assert!(execution.sent().is_empty());

    let decoded =
        IEigenPod::verifyWithdrawalCredentialsCall::abi_decode(&transactions[0].call_data).unwrap();
    assert_eq!(decoded.beaconTimestamp, BLOCK_TIMESTAMP);
    assert_eq!(decoded.validatorIndices.len(), 1);
    assert_eq!(decoded.validatorIndices[0].to::<u64>(), 2);
}

#[tokio::test]
async fn test_credentials_specific_validator_must_match() {
    let snapshot = pod_snapshot(&[2, 4]);
    let pod = FakePod::default();
    let execution = FakeExecution::new(snapshot.block_root());
    let beacon = FakeBeacon { snapshot };
    let config = config();
    let workers = ProofWorkers::new(1).unwrap();
    let ctx = context(&config, &beacon, &execution, &pod, &workers);

    let options = SubmitOptions::new(false, None, 20, 1).unwrap();
    let err = credentials::run(&ctx, &options, Some(3)).await.unwrap_err();
    assert!(matches!(err, ProverError::Proof(_)));
    assert_eq!(err.exit_code(), 4);
}

#[tokio::test]
async fn test_credentials_nothing_to_prove() {
    let snapshot = pod_snapshot(&[]);
    let pod = FakePod::default();
    let execution = FakeExecution::new(snapshot.block_root());
    let beacon = FakeBeacon { snapshot };
    let config = config();
    let workers = ProofWorkers::new(1).unwrap();
    let ctx = context(&config, &beacon, &execution, &pod, &workers);

    let options = SubmitOptions::new(false, Some(ANVIL_KEY), 20, 1).unwrap();
    let output = credentials::run(&ctx, &options, None).await.unwrap();
    assert!(matches!(output, CommandOutput::Nothing(_)));
    assert!(execution.sent().is_empty());
}

#[tokio::test]
async fn test_checkpoint_partial_submission() {
    let snapshot = pod_snapshot(&[1, 2, 4]);
    let mut pod = FakePod::default()
        .with_validator(&snapshot, 1, ValidatorStatus::Active)
        .with_validator(&snapshot, 2, ValidatorStatus::Active)
        .with_validator(&snapshot, 4, ValidatorStatus::Active);
    pod.checkpoint = Some(Checkpoint::new(
        1_700_000_000,
        snapshot.block_root(),
        3,
        0,
        0,
        96_000_000_000,
    ));
    let mut execution = FakeExecution::new(snapshot.block_root());
    execution.fail_at = Some(1);
    let beacon = FakeBeacon {
        snapshot: snapshot.clone(),
    };
    let config = config();
    let workers = ProofWorkers::new(2).unwrap();
    let ctx = context(&config, &beacon, &execution, &pod, &workers);

    let options = SubmitOptions::new(false, Some(ANVIL_KEY), 2, 1).unwrap();
    let mut output = checkpoint::run(&ctx, &options, false).await.unwrap();
    let CommandOutput::Submitted(report) = &output else {
        panic!("expected a submission report, got {output:?}");
    };
    assert_eq!(report.proven, vec![1, 2]);
    assert_eq!(report.unproven, vec![4]);
    assert_eq!(report.proofs_remaining, Some(1));
    assert_eq!(report.tx_hashes().len(), 1);

    let sent = execution.sent();
    assert_eq!(sent.len(), 2);
    let first = IEigenPod::verifyCheckpointProofsCall::abi_decode(&sent[0].data).unwrap();
    assert_eq!(first.proofs.len(), 2);
    let second = IEigenPod::verifyCheckpointProofsCall::abi_decode(&sent[1].data).unwrap();
    assert_eq!(second.proofs.len(), 1);
    assert_eq!(
        first.balanceContainerProof.balanceContainerRoot.0,
        snapshot.balances_root()
    );

    let err = output.take_error().unwrap();
    assert!(matches!(err, ProverError::Submission(ref e) if e.chunk_index == 1));
    assert_eq!(err.exit_code(), 5);
}

#[tokio::test]
async fn test_checkpoint_refuses_more_targets_than_owed() {
    let snapshot = pod_snapshot(&[1, 2, 4]);
    let mut pod = FakePod::default()
        .with_validator(&snapshot, 1, ValidatorStatus::Active)
        .with_validator(&snapshot, 2, ValidatorStatus::Active)
        .with_validator(&snapshot, 4, ValidatorStatus::Active);
    pod.checkpoint = Some(Checkpoint::new(1_700_000_000, snapshot.block_root(), 1, 0, 0, 0));
    let execution = FakeExecution::new(snapshot.block_root());
    let beacon = FakeBeacon { snapshot };
    let config = config();
    let workers = ProofWorkers::new(2).unwrap();
    let ctx = context(&config, &beacon, &execution, &pod, &workers);

    let options = SubmitOptions::new(false, Some(ANVIL_KEY), 1, 1).unwrap();
    let err = checkpoint::run(&ctx, &options, false).await.unwrap_err();
    assert!(matches!(
        err,
        ProverError::Checkpoint(CheckpointError::OverSubmission {
            remaining: 1,
            submitted: 3
        })
    ));
    assert_eq!(err.exit_code(), 4);
    assert!(execution.sent().is_empty());
}

#[tokio::test]
async fn test_checkpoint_proofs_without_mode() {
    let snapshot = pod_snapshot(&[1, 3]);
    let mut pod = FakePod::default()
        .with_validator(&snapshot, 1, ValidatorStatus::Active)
        .with_validator(&snapshot, 3, ValidatorStatus::Withdrawn);
    pod.checkpoint = Some(Checkpoint::new(1_700_000_000, snapshot.block_root(), 1, 0, 0, 0));
    let execution = FakeExecution::new(snapshot.block_root());
    let beacon = FakeBeacon { snapshot };
    let config = config();
    let workers = ProofWorkers::new(2).unwrap();
    let ctx = context(&config, &beacon, &execution, &pod, &workers);

    let options = SubmitOptions::new(false, None, 80, 1).unwrap();
    let output = checkpoint::run(&ctx, &options, false).await.unwrap();
    let CommandOutput::Proofs(document) = output else {
        panic!("expected a proof document, got {output:?}");
    };
    assert!(document.validator_balances_root_proof.is_some());
    let indices: Vec<u64> = document.per_validator.iter().map(|v| v.index).collect();
    assert_eq!(indices, vec![1]);
    assert!(document.per_validator[0].balance.is_some());
}

#[tokio::test]
async fn test_checkpoint_start_is_simulated() {
    let snapshot = pod_snapshot(&[1]);
    let pod = FakePod::default().with_validator(&snapshot, 1, ValidatorStatus::Active);
    let execution = FakeExecution::new(snapshot.block_root());
    let beacon = FakeBeacon { snapshot };
    let config = config();
    let workers = ProofWorkers::new(1).unwrap();
    let ctx = context(&config, &beacon, &execution, &pod, &workers);

    let options = SubmitOptions::new(true, None, 80, 1).unwrap();
    let output = checkpoint::run(&ctx, &options, true).await.unwrap();
    let CommandOutput::Simulated(transactions) = output else {
        panic!("expected simulated transactions, got {output:?}");
    };
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].kind, "startCheckpoint");
    let decoded = IEigenPod::startCheckpointCall::abi_decode(&transactions[0].call_data).unwrap();
    assert!(!decoded.revertIfNoBalance);
    assert!(execution.sent().is_empty());
}

#[tokio::test]
async fn test_checkpoint_start_needs_balance() {
    let snapshot = pod_snapshot(&[1]);
    let pod = FakePod {
        withdrawable_gwei: 5,
        ..FakePod::default()
    };
    let mut execution = FakeExecution::new(snapshot.block_root());
    execution.pod_balance_gwei = 5;
    let beacon = FakeBeacon { snapshot };
    let config = config();
    let workers = ProofWorkers::new(1).unwrap();
    let ctx = context(&config, &beacon, &execution, &pod, &workers);

    let options = SubmitOptions::new(false, Some(ANVIL_KEY), 80, 1).unwrap();
    let output = checkpoint::run(&ctx, &options, false).await.unwrap();
    assert!(matches!(output, CommandOutput::Nothing(_)));
    assert!(execution.sent().is_empty());

    let proofs_only = SubmitOptions::new(false, None, 80, 1).unwrap();
    let err = checkpoint::run(&ctx, &proofs_only, false).await.unwrap_err();
    assert!(matches!(err, ProverError::Checkpoint(_)));
}

#[tokio::test]
async fn test_status_preview() {
    let snapshot = pod_snapshot(&[2, 4]);
    let pod = FakePod {
        shares_gwei: 32_000_000_000,
        ..FakePod::default()
    }
    .with_validator(&snapshot, 2, ValidatorStatus::Active)
    .with_validator(&snapshot, 4, ValidatorStatus::Inactive);
    let mut execution = FakeExecution::new(snapshot.block_root());
    execution.pod_balance_gwei = 1_000_000_000;
    let beacon = FakeBeacon { snapshot };
    let config = config();
    let workers = ProofWorkers::new(1).unwrap();
    let ctx = context(&config, &beacon, &execution, &pod, &workers);

    let output = status::run(&ctx).await.unwrap();
    let CommandOutput::Status(report) = output else {
        panic!("expected a status report, got {output:?}");
    };
    assert_eq!(report.count(ValidatorStatus::Active), 1);
    assert_eq!(report.count(ValidatorStatus::Inactive), 1);
    assert!(report.checkpoint.is_none());
    // 1 ETH in the pod plus validator 2's 2_000_000 gwei above its restaked balance
    assert_eq!(report.projection.delta_gwei(), 1_002_000_000);
}

#[tokio::test]
async fn test_proof_build_off_runtime() {
    let snapshot = pod_snapshot(&[]);
    let pod = FakePod::default();
    let execution = FakeExecution::new(snapshot.block_root());
    let beacon = FakeBeacon { snapshot };
    let config = config();
    let workers = ProofWorkers::new(2).unwrap();
    let ctx = context(&config, &beacon, &execution, &pod, &workers);

    let doubled = ctx
        .prove(|workers| workers.map(&[1u64, 2, 3], |x| Ok(x * 2)))
        .await
        .unwrap();
    assert_eq!(doubled, vec![2, 4, 6]);

    let err = ctx
        .prove(|_| Err::<(), _>(ProofError::ValidatorNotFound(9)))
        .await
        .unwrap_err();
    assert!(matches!(err, ProverError::Proof(ProofError::ValidatorNotFound(9))));

    ctx.cancel.cancel();
    let err = ctx.prove(|_| Ok(())).await.unwrap_err();
    assert!(matches!(err, ProverError::Cancelled));
}

#[test]
fn test_simulate_and_send_are_exclusive() {
    let err = SubmitOptions::new(true, Some(ANVIL_KEY), 20, 1).unwrap_err();
    assert_eq!(err, ConfigError::ConflictingModes);
    assert_eq!(ProverError::from(err).exit_code(), 2);
}
