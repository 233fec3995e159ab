//! Top-level error and exit codes.

use crate::config::ConfigError;
use crate::contract::ContractError;
use crate::submitter::SubmissionError;
use pod_proofs::{BeaconClientError, CheckpointError, ProofError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProverError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Beacon node: {0}")]
    Beacon(#[from] BeaconClientError),

    #[error("Execution client: {0}")]
    Contract(#[from] ContractError),

    #[error("{what} timed out after {timeout:?}")]
    Timeout {
        what: &'static str,
        timeout: Duration,
    },

    #[error("Proof generation failed: {0}")]
    Proof(#[from] ProofError),

    #[error("Checkpoint: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Submission failed: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Cancelled")]
    Cancelled,

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("Failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ProverError {
    /// Process exit code for this error
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Beacon(_) | Self::Contract(_) | Self::Timeout { .. } => 3,
            Self::Proof(_) | Self::Checkpoint(_) => 4,
            Self::Submission(_) => 5,
            Self::Cancelled => 130,
            Self::Output(_) | Self::Serialize(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ProverError::from(ConfigError::ZeroBatchSize).exit_code(), 2);
        assert_eq!(
            ProverError::from(BeaconClientError::NotFound("Block head".into())).exit_code(),
            3
        );
        assert_eq!(
            ProverError::Timeout {
                what: "latest block",
                timeout: Duration::from_secs(1)
            }
            .exit_code(),
            3
        );
        assert_eq!(
            ProverError::from(ProofError::ValidatorNotFound(3)).exit_code(),
            4
        );
        assert_eq!(ProverError::Cancelled.exit_code(), 130);
    }
}
