//! # Pod Prover
//!
//! Command line driver for EigenPod proofs: reads chain state, builds proofs
//! with `pod-proofs`, and prints, simulates, or submits them.

pub mod cli;
pub mod commands;
pub mod config;
pub mod contract;
pub mod error;
pub mod net;
pub mod output;
pub mod submitter;

pub use commands::{CommandResult, ProverContext};
pub use config::{ProverConfig, SubmissionMode, SubmitOptions};
pub use error::ProverError;
pub use output::{write_output, CommandOutput};
