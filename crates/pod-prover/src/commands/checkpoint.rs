//! `checkpoint`: start a checkpoint if needed, then prove every pending
//! validator balance against the checkpoint's block.

use super::{submission_output, CommandResult, ProverContext};
use crate::config::{SubmissionMode, SubmitOptions};
use crate::contract::{start_checkpoint_call, verify_checkpoint_proofs_call};
use crate::error::ProverError;
use crate::output::CommandOutput;
use crate::submitter::{partition, ProofBatch, Submitter};
use pod_proofs::{
    build_checkpoint_proof, checkpoint_targets, find_matching_validators, Checkpoint,
    CheckpointError, CheckpointPhase, StateId,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

const START_KIND: &str = "startCheckpoint";
const VERIFY_KIND: &str = "verifyCheckpointProofs";

/// # Errors
/// Fails on connectivity or proof errors, or if a batch fails to submit.
#[instrument(skip_all, fields(pod = %ctx.pod.address(), force = force))]
pub async fn run(ctx: &ProverContext<'_>, options: &SubmitOptions, force: bool) -> CommandResult {
    let active = ctx
        .read("current checkpoint", ctx.pod.current_checkpoint())
        .await?;

    let checkpoint = match active {
        Some(checkpoint) => checkpoint,
        None => match start(ctx, options, force).await? {
            StartOutcome::Active(checkpoint) => checkpoint,
            StartOutcome::Done(output) => return Ok(output),
        },
    };
    prove(ctx, options, checkpoint).await
}

enum StartOutcome {
    Active(Checkpoint),
    Done(CommandOutput),
}

async fn start(
    ctx: &ProverContext<'_>,
    options: &SubmitOptions,
    force: bool,
) -> Result<StartOutcome, ProverError> {
    let phase = CheckpointPhase::NoActiveCheckpoint;
    let Some(mode) = &options.mode else {
        return Err(CheckpointError::InvalidTransition {
            phase: phase.name(),
            action: "prove a checkpoint without --sender or --print-calldata",
        }
        .into());
    };

    let pod = ctx.pod.address();
    if let SubmissionMode::Send(_) = mode {
        let pod_balance_gwei = ctx
            .read("pod balance", ctx.execution.balance_gwei(pod))
            .await?;
        let withdrawable_gwei = ctx
            .read("withdrawable balance", ctx.pod.withdrawable_restaked_gwei())
            .await?;
        let creditable = i128::from(pod_balance_gwei) - i128::from(withdrawable_gwei);
        if creditable <= 0 && !force {
            info!(pod_balance_gwei, withdrawable_gwei, "Pod holds no new native ETH");
            return Ok(StartOutcome::Done(CommandOutput::Nothing(
                "Pod holds no native ETH to credit; pass --force to checkpoint anyway".into(),
            )));
        }
    }

    let start_batch = vec![ProofBatch::<()> {
        chunk_index: 0,
        validator_indices: vec![],
        items: vec![],
    }];
    let submitter = Submitter::new(
        ctx.execution,
        mode,
        options.confirmations,
        ctx.config.tx_timeout,
        ctx.cancel.clone(),
    );
    let mut report = submitter
        .submit(start_batch, |_| Ok(start_checkpoint_call(pod, !force)), |_| Ok(()))
        .await;
    if let Some(failure) = report.take_failure() {
        return Err(failure.into());
    }
    if report.cancelled {
        return Err(ProverError::Cancelled);
    }
    if let SubmissionMode::SimulateOnly = mode {
        return Ok(StartOutcome::Done(CommandOutput::Simulated(
            report.simulated(START_KIND),
        )));
    }

    let started = ctx
        .read("current checkpoint", ctx.pod.current_checkpoint())
        .await?;
    match started {
        Some(checkpoint) => {
            info!(
                proofs_remaining = checkpoint.proofs_remaining,
                tx_hashes = ?report.tx_hashes(),
                "Checkpoint started"
            );
            Ok(StartOutcome::Active(checkpoint))
        }
        // the pod completes a checkpoint with no active validators immediately
        None => {
            info!("Checkpoint completed on start");
            Ok(StartOutcome::Done(CommandOutput::Submitted(report)))
        }
    }
}

async fn prove(
    ctx: &ProverContext<'_>,
    options: &SubmitOptions,
    checkpoint: Checkpoint,
) -> CommandResult {
    let phase = CheckpointPhase::Started(checkpoint).await_proofs()?;
    let CheckpointPhase::ProofsPending(mut progress) = phase else {
        return Ok(CommandOutput::Nothing(
            "Checkpoint has no proofs remaining".into(),
        ));
    };
    let checkpoint = progress.checkpoint().clone();

    let snapshot = ctx
        .snapshot(StateId::BlockRoot(checkpoint.beacon_block_root))
        .await?;
    let pod = ctx.pod.address();
    let matching = find_matching_validators(&snapshot, &pod.0 .0, None)?;
    let validators = ctx.pod_validators(&snapshot, matching).await?;

    let targets = checkpoint_targets(&validators, &checkpoint);
    let found = u64::try_from(targets.len()).unwrap_or(u64::MAX);
    // more proofs than the pod owes would revert once it reaches zero
    if found > progress.remaining() {
        return Err(CheckpointError::OverSubmission {
            remaining: progress.remaining(),
            submitted: found,
        }
        .into());
    }
    if found < progress.remaining() {
        warn!(
            targets = found,
            proofs_remaining = progress.remaining(),
            "Fewer checkpoint targets than the pod's proofsRemaining"
        );
    }
    if targets.is_empty() {
        return Ok(CommandOutput::Nothing(
            "No validators left to prove for this checkpoint".into(),
        ));
    }

    let proofs = {
        let snapshot = Arc::clone(&snapshot);
        let checkpoint = checkpoint.clone();
        ctx.prove(move |workers| build_checkpoint_proof(&snapshot, &checkpoint, &targets, workers))
            .await?
    };
    info!(validators = proofs.balance_proofs.len(), "Built checkpoint proofs");

    let Some(mode) = &options.mode else {
        return Ok(CommandOutput::Proofs(proofs.to_document(&snapshot)));
    };

    let batches = partition(&proofs.balance_proofs, options.batch_size, |p| {
        p.validator_index
    });
    let submitter = Submitter::new(
        ctx.execution,
        mode,
        options.confirmations,
        ctx.config.tx_timeout,
        ctx.cancel.clone(),
    );

    let mut report = submitter
        .submit(
            batches,
            |batch| {
                Ok(verify_checkpoint_proofs_call(
                    pod,
                    &proofs.balance_container_proof,
                    &batch.items,
                ))
            },
            |batch| {
                let proven = u64::try_from(batch.items.len()).unwrap_or(u64::MAX);
                Ok(progress.record(proven)?)
            },
        )
        .await;

    if progress.is_complete() {
        info!("Checkpoint completed");
    }
    report.proofs_remaining = Some(progress.remaining());
    Ok(submission_output(mode, report, VERIFY_KIND))
}
