//! Transaction Submitter
//!
//! Splits proofs into bounded batches and submits them one transaction per
//! batch, or only computes each batch's call data when simulating. Batches run
//! strictly in order; the first failure stops the run and earlier batches
//! stay submitted.

use crate::config::SubmissionMode;
use crate::contract::{CallData, ContractError, ExecutionClient};
use alloy::primitives::{Address, Bytes, B256};
use pod_proofs::CheckpointError;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Why a batch stopped the run
#[derive(Debug, Error)]
pub enum BatchFailure {
    #[error(transparent)]
    Contract(#[from] ContractError),

    /// The transaction landed but its proofs could not be accounted for
    #[error("Accepted batch not accounted: {0}")]
    Accounting(#[from] CheckpointError),
}

/// A batch failed to encode, submit, or be accounted for
#[derive(Debug, Error)]
#[error("batch {chunk_index} (validators {validator_indices:?}): {source}")]
pub struct SubmissionError {
    pub chunk_index: usize,
    pub validator_indices: Vec<u64>,
    #[source]
    pub source: BatchFailure,
}

/// One transaction's worth of proofs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofBatch<T> {
    pub chunk_index: usize,
    pub validator_indices: Vec<u64>,
    pub items: Vec<T>,
}

/// Split `items` into contiguous batches of at most `batch_size`.
///
/// Returns `ceil(N / batch_size)` batches; only the last may be smaller.
/// `index_of` names the validator each item proves. A zero `batch_size` is
/// rejected earlier by configuration and yields a single batch here.
pub fn partition<T: Clone>(
    items: &[T],
    batch_size: usize,
    index_of: impl Fn(&T) -> u64,
) -> Vec<ProofBatch<T>> {
    items
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(chunk_index, chunk)| ProofBatch {
            chunk_index,
            validator_indices: chunk.iter().map(&index_of).collect(),
            items: chunk.to_vec(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    Sent {
        tx_hash: B256,
    },
    Simulated {
        call_data: CallData,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub chunk_index: usize,
    pub validator_indices: Vec<u64>,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

/// A simulated transaction as printed for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedTransaction {
    #[serde(rename = "type")]
    pub kind: String,
    pub to: Address,
    pub call_data: Bytes,
    pub validator_indices: Vec<u64>,
}

/// Outcome of a submission run
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReport {
    pub batches: Vec<BatchResult>,
    /// Validators whose proofs were accepted
    pub proven: Vec<u64>,
    /// Validators whose proofs were not submitted or not accepted
    pub unproven: Vec<u64>,
    pub cancelled: bool,
    /// Checkpoint proofs still owed after the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proofs_remaining: Option<u64>,
    #[serde(skip)]
    failure: Option<SubmissionError>,
}

impl SubmissionReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && !self.cancelled
    }

    /// Take the first failure, leaving the report printable
    pub fn take_failure(&mut self) -> Option<SubmissionError> {
        self.failure.take()
    }

    #[must_use]
    pub fn tx_hashes(&self) -> Vec<B256> {
        self.batches
            .iter()
            .filter_map(|b| match &b.outcome {
                BatchOutcome::Sent { tx_hash } => Some(*tx_hash),
                _ => None,
            })
            .collect()
    }

    /// Simulated batches labelled with `kind`
    #[must_use]
    pub fn simulated(&self, kind: &str) -> Vec<SimulatedTransaction> {
        self.batches
            .iter()
            .filter_map(|b| match &b.outcome {
                BatchOutcome::Simulated { call_data } => Some(SimulatedTransaction {
                    kind: kind.to_string(),
                    to: call_data.to,
                    call_data: call_data.data.clone(),
                    validator_indices: b.validator_indices.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    fn record_failure(&mut self, chunk_index: usize, validator_indices: &[u64], source: ContractError) {
        self.batches.push(BatchResult {
            chunk_index,
            validator_indices: validator_indices.to_vec(),
            outcome: BatchOutcome::Failed {
                error: source.to_string(),
            },
        });
        self.unproven.extend_from_slice(validator_indices);
        self.stop(chunk_index, validator_indices, source.into());
    }

    fn stop(&mut self, chunk_index: usize, validator_indices: &[u64], source: BatchFailure) {
        error!(chunk_index, error = %source, "Batch failed");
        self.failure = Some(SubmissionError {
            chunk_index,
            validator_indices: validator_indices.to_vec(),
            source,
        });
    }
}

/// Sequential batch submitter
pub struct Submitter<'a> {
    execution: &'a dyn ExecutionClient,
    mode: &'a SubmissionMode,
    confirmations: u64,
    tx_timeout: Duration,
    cancel: CancellationToken,
}

impl<'a> Submitter<'a> {
    #[must_use]
    pub fn new(
        execution: &'a dyn ExecutionClient,
        mode: &'a SubmissionMode,
        confirmations: u64,
        tx_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            execution,
            mode,
            confirmations,
            tx_timeout,
            cancel,
        }
    }

    /// Submit or simulate every batch in order.
    ///
    /// `encode` builds each batch's call data; `on_success` runs after each
    /// batch is accepted on chain, and an error from it stops the run with
    /// that batch still counted as proven. Failures are recorded in the
    /// report, which is always returned.
    #[instrument(skip_all, fields(batches = batches.len()))]
    pub async fn submit<T, E, S>(
        &self,
        batches: Vec<ProofBatch<T>>,
        encode: E,
        mut on_success: S,
    ) -> SubmissionReport
    where
        E: Fn(&ProofBatch<T>) -> Result<CallData, ContractError>,
        S: FnMut(&ProofBatch<T>) -> Result<(), BatchFailure>,
    {
        let mut report = SubmissionReport::default();
        let mut batches = batches.into_iter();

        for batch in batches.by_ref() {
            if self.cancel.is_cancelled() {
                warn!(chunk_index = batch.chunk_index, "Cancelled before batch");
                report.cancelled = true;
                report.unproven.extend_from_slice(&batch.validator_indices);
                break;
            }

            let call = match encode(&batch) {
                Ok(call) => call,
                Err(e) => {
                    report.record_failure(batch.chunk_index, &batch.validator_indices, e);
                    break;
                }
            };

            match self.mode {
                SubmissionMode::SimulateOnly => {
                    report.unproven.extend_from_slice(&batch.validator_indices);
                    report.batches.push(BatchResult {
                        chunk_index: batch.chunk_index,
                        validator_indices: batch.validator_indices,
                        outcome: BatchOutcome::Simulated { call_data: call },
                    });
                }
                SubmissionMode::Send(signer) => {
                    let send = self.execution.send_transaction(&call, signer, self.confirmations);
                    let result = tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => None,
                        res = tokio::time::timeout(self.tx_timeout, send) => Some(
                            res.unwrap_or(Err(ContractError::Timeout(self.tx_timeout)))
                        ),
                    };

                    match result {
                        None => {
                            warn!(chunk_index = batch.chunk_index, "Cancelled during batch");
                            report.cancelled = true;
                            report.unproven.extend_from_slice(&batch.validator_indices);
                            break;
                        }
                        Some(Ok(tx_hash)) => {
                            info!(
                                chunk_index = batch.chunk_index,
                                tx_hash = %tx_hash,
                                validators = batch.validator_indices.len(),
                                "Batch submitted"
                            );
                            report.proven.extend_from_slice(&batch.validator_indices);
                            report.batches.push(BatchResult {
                                chunk_index: batch.chunk_index,
                                validator_indices: batch.validator_indices.clone(),
                                outcome: BatchOutcome::Sent { tx_hash },
                            });
                            if let Err(e) = on_success(&batch) {
                                report.stop(batch.chunk_index, &batch.validator_indices, e);
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            report.record_failure(batch.chunk_index, &batch.validator_indices, e);
                            break;
                        }
                    }
                }
            }
        }

        // batches never attempted
        for batch in batches {
            report.unproven.extend(batch.validator_indices);
        }
        report
    }
}
