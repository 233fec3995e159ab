//! `credentials`: prove the withdrawal credentials of validators the pod has
//! not seen yet.

use super::{submission_output, CommandResult, ProverContext};
use crate::config::SubmitOptions;
use crate::contract::verify_withdrawal_credentials_call;
use crate::output::CommandOutput;
use crate::submitter::{partition, Submitter};
use pod_proofs::{build_credential_proofs, find_matching_validators, StateId, ValidatorStatus};
use std::sync::Arc;
use tracing::{info, instrument};

const VERIFY_KIND: &str = "verifyWithdrawalCredentials";

/// # Errors
/// Fails on connectivity or proof errors, if `validator_index` does not
/// withdraw to the pod, or if a batch fails to submit.
#[instrument(skip_all, fields(pod = %ctx.pod.address(), validator_index = ?validator_index))]
pub async fn run(
    ctx: &ProverContext<'_>,
    options: &SubmitOptions,
    validator_index: Option<u64>,
) -> CommandResult {
    // The pod checks the state root against the EIP-4788 root for this timestamp
    let block = ctx.read("latest block", ctx.execution.latest_block()).await?;
    info!(
        block = block.number,
        timestamp = block.timestamp,
        "Proving against the latest block's parent beacon root"
    );
    let snapshot = ctx
        .snapshot(StateId::BlockRoot(block.parent_beacon_block_root))
        .await?;

    let pod = ctx.pod.address();
    let matching = find_matching_validators(&snapshot, &pod.0 .0, validator_index)?;
    let validators = ctx.pod_validators(&snapshot, matching).await?;

    let targets: Vec<u64> = validators
        .iter()
        .filter(|v| v.status == ValidatorStatus::Inactive)
        .map(|v| v.index)
        .collect();
    info!(
        withdrawing_to_pod = validators.len(),
        unverified = targets.len(),
        "Selected validators"
    );
    if targets.is_empty() {
        return Ok(CommandOutput::Nothing(
            "All validators withdrawing to the pod are already verified".into(),
        ));
    }

    let proofs = {
        let snapshot = Arc::clone(&snapshot);
        ctx.prove(move |workers| build_credential_proofs(&snapshot, &targets, workers))
            .await?
    };

    let Some(mode) = &options.mode else {
        let mut document = proofs.to_document(&snapshot);
        document.beacon_timestamp = block.timestamp;
        return Ok(CommandOutput::Proofs(document));
    };

    let batches = partition(&proofs.validator_proofs, options.batch_size, |p| {
        p.validator_index
    });
    let submitter = Submitter::new(
        ctx.execution,
        mode,
        options.confirmations,
        ctx.config.tx_timeout,
        ctx.cancel.clone(),
    );
    let report = submitter
        .submit(
            batches,
            |batch| {
                verify_withdrawal_credentials_call(
                    pod,
                    block.timestamp,
                    &proofs.state_root_proof,
                    &batch.items,
                )
            },
            |_| Ok(()),
        )
        .await;

    Ok(submission_output(mode, report, VERIFY_KIND))
}
