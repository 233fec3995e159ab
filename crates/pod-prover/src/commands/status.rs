//! `status`: the pod's validators, its checkpoint and projected shares.

use super::{CommandResult, ProverContext};
use crate::output::CommandOutput;
use alloy::primitives::Address;
use pod_proofs::checkpoint::{gwei_to_eth, ProjectionSource};
use pod_proofs::{
    find_matching_validators, Checkpoint, PodState, PodValidator, ShareProjection, StateId,
    ValidatorStatus,
};
use serde::Serialize;
use std::fmt::Write as _;
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorRow {
    pub index: u64,
    pub pubkey_hash: String,
    pub status: ValidatorStatus,
    pub slashed: bool,
    pub balance_gwei: u64,
    pub restaked_balance_gwei: u64,
    pub last_checkpointed_at: u64,
}

impl From<&PodValidator> for ValidatorRow {
    fn from(v: &PodValidator) -> Self {
        Self {
            index: v.index,
            pubkey_hash: format!("0x{}", hex::encode(v.validator.pubkey_hash())),
            status: v.status,
            slashed: v.validator.slashed,
            balance_gwei: v.balance_gwei,
            restaked_balance_gwei: v.restaked_balance_gwei,
            last_checkpointed_at: v.last_checkpointed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub chain_id: u64,
    pub pod_address: Address,
    pub slot: u64,
    pub pod_balance_gwei: u64,
    pub withdrawable_restaked_gwei: u64,
    pub current_shares_gwei: i128,
    pub validators: Vec<ValidatorRow>,
    pub checkpoint: Option<Checkpoint>,
    pub projection: ShareProjection,
}

impl StatusReport {
    #[must_use]
    pub fn count(&self, status: ValidatorStatus) -> usize {
        self.validators.iter().filter(|v| v.status == status).count()
    }
}

/// # Errors
/// Fails if the beacon node or execution client cannot be read.
#[instrument(skip_all, fields(pod = %ctx.pod.address()))]
pub async fn run(ctx: &ProverContext<'_>) -> CommandResult {
    let chain_id = ctx.read("chain id", ctx.execution.chain_id()).await?;
    let snapshot = ctx.snapshot(StateId::Head).await?;

    let pod_address = ctx.pod.address();
    let matching = find_matching_validators(&snapshot, &pod_address.0 .0, None)?;
    let validators = ctx.pod_validators(&snapshot, matching).await?;

    let pod_balance_gwei = ctx
        .read("pod balance", ctx.execution.balance_gwei(pod_address))
        .await?;
    let withdrawable_restaked_gwei = ctx
        .read("withdrawable balance", ctx.pod.withdrawable_restaked_gwei())
        .await?;
    let current_shares_gwei = ctx
        .read("pod owner shares", ctx.pod.pod_owner_shares_gwei())
        .await?;
    let checkpoint = ctx
        .read("current checkpoint", ctx.pod.current_checkpoint())
        .await?;

    let state = PodState {
        current_shares_gwei,
        pod_balance_gwei,
        withdrawable_restaked_gwei,
        validators,
        checkpoint,
    };
    let projection = ShareProjection::compute(&state);

    Ok(CommandOutput::Status(StatusReport {
        chain_id,
        pod_address,
        slot: snapshot.slot(),
        pod_balance_gwei,
        withdrawable_restaked_gwei,
        current_shares_gwei,
        validators: state.validators.iter().map(ValidatorRow::from).collect(),
        checkpoint: state.checkpoint,
        projection,
    }))
}

/// Human readable status
#[must_use]
pub fn render_text(report: &StatusReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Pod {} (chain {}, slot {})", report.pod_address, report.chain_id, report.slot);
    let _ = writeln!(
        out,
        "Validators: {} active, {} inactive, {} withdrawn",
        report.count(ValidatorStatus::Active),
        report.count(ValidatorStatus::Inactive),
        report.count(ValidatorStatus::Withdrawn),
    );

    for v in &report.validators {
        let _ = writeln!(
            out,
            "  #{:<10} {:<9} balance {:>14} gwei  restaked {:>14} gwei{}",
            v.index,
            v.status.label(),
            v.balance_gwei,
            v.restaked_balance_gwei,
            if v.slashed { "  SLASHED" } else { "" },
        );
    }

    let _ = writeln!(
        out,
        "Pod balance: {} ETH ({} ETH withdrawable)",
        gwei_to_eth(i128::from(report.pod_balance_gwei)),
        gwei_to_eth(i128::from(report.withdrawable_restaked_gwei)),
    );

    match &report.checkpoint {
        Some(cp) => {
            let _ = writeln!(
                out,
                "Active checkpoint started at {} for block 0x{}: {} proofs remaining",
                cp.started_at_timestamp,
                hex::encode(cp.beacon_block_root),
                cp.proofs_remaining,
            );
        }
        None => {
            let _ = writeln!(out, "No active checkpoint");
        }
    }

    let label = match report.projection.source {
        ProjectionSource::ActiveCheckpoint => "On completion",
        ProjectionSource::Preview => "A new checkpoint would",
    };
    let _ = writeln!(
        out,
        "Shares: {} ETH. {label} change shares by {:+} ETH",
        gwei_to_eth(report.current_shares_gwei),
        report.projection.delta_eth(),
    );
    out
}
