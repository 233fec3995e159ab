//! Subcommand drivers.
//!
//! Each driver reads chain state through the injected clients, calls into
//! `pod-proofs`, and returns a [`CommandOutput`] for the boundary to print.

pub mod checkpoint;
pub mod credentials;
pub mod status;

use crate::config::{ProverConfig, SubmissionMode};
use crate::contract::{ExecutionClient, PodContract};
use crate::error::ProverError;
use crate::net;
use crate::output::CommandOutput;
use crate::submitter::SubmissionReport;
use pod_proofs::{
    BeaconApi, BeaconStateSnapshot, PodValidator, ProofError, ProofWorkers, StateId,
    ValidatorWithIndex,
};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Collaborators shared by every subcommand
pub struct ProverContext<'a> {
    pub config: &'a ProverConfig,
    pub beacon: &'a dyn BeaconApi,
    pub execution: &'a dyn ExecutionClient,
    pub pod: &'a dyn PodContract,
    pub workers: &'a ProofWorkers,
    pub cancel: CancellationToken,
}

impl ProverContext<'_> {
    /// Run a chain read under the request timeout and the cancellation token.
    ///
    /// # Errors
    /// The read's own error, a timeout, or cancellation.
    pub async fn read<T, E, F>(&self, what: &'static str, fut: F) -> Result<T, ProverError>
    where
        F: Future<Output = Result<T, E>>,
        ProverError: From<E>,
    {
        net::guarded(&self.cancel, self.config.request_timeout, what, fut).await
    }

    /// Fetch a snapshot; bounded by the beacon client's own per-request timeouts.
    ///
    /// The snapshot is shared so proof builds can run on the worker pool.
    ///
    /// # Errors
    /// Beacon client errors or cancellation.
    pub async fn snapshot(
        &self,
        state_id: StateId,
    ) -> Result<Arc<BeaconStateSnapshot>, ProverError> {
        info!(%state_id, "Fetching beacon state");
        net::cancellable(&self.cancel, self.beacon.fetch_snapshot(&state_id))
            .await
            .map(Arc::new)
    }

    /// Build proofs on the worker pool off the async runtime.
    ///
    /// Stops waiting when the cancellation token fires; the build itself
    /// runs to completion in the background.
    ///
    /// # Errors
    /// The build's own error, a failed worker task, or cancellation.
    pub async fn prove<T, F>(&self, build: F) -> Result<T, ProverError>
    where
        T: Send + 'static,
        F: FnOnce(&ProofWorkers) -> Result<T, ProofError> + Send + 'static,
    {
        let workers = self.workers.clone();
        let task = tokio::task::spawn_blocking(move || build(&workers));
        let built = net::cancellable(&self.cancel, async {
            task.await
                .map_err(|e| ProofError::WorkerPool(format!("Proof task failed: {e}")))
        })
        .await?;
        Ok(built?)
    }

    /// Join each beacon validator with the pod's record of it, in order.
    ///
    /// # Errors
    /// Fails on the first contract read that fails.
    pub async fn pod_validators(
        &self,
        snapshot: &BeaconStateSnapshot,
        validators: Vec<ValidatorWithIndex>,
    ) -> Result<Vec<PodValidator>, ProverError> {
        let mut joined = Vec::with_capacity(validators.len());
        for ValidatorWithIndex { index, validator } in validators {
            let info = self
                .read("validator info", self.pod.validator_info(validator.pubkey_hash()))
                .await?;
            debug!(index, status = %info.status, "Read validator info");
            joined.push(PodValidator {
                index,
                balance_gwei: snapshot.balance(index).unwrap_or_default(),
                restaked_balance_gwei: info.restaked_balance_gwei,
                last_checkpointed_at: info.last_checkpointed_at,
                status: info.status,
                validator,
            });
        }
        Ok(joined)
    }
}

/// Subcommand result before printing
pub type CommandResult = Result<CommandOutput, ProverError>;

/// Simulated runs print the transactions they would send; real runs print the report.
#[must_use]
pub fn submission_output(
    mode: &SubmissionMode,
    report: SubmissionReport,
    kind: &'static str,
) -> CommandOutput {
    match mode {
        SubmissionMode::SimulateOnly => CommandOutput::Simulated(report.simulated(kind)),
        SubmissionMode::Send(_) => CommandOutput::Submitted(report),
    }
}
