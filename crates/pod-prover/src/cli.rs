//! Command line arguments.

use crate::config::{
    parse_pod_address, parse_url, ConfigError, OutputOptions, ProverConfig, SubmitOptions,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use pod_proofs::ProofWorkers;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "pod-prover")]
#[command(about = "Prove and submit EigenPod checkpoints and withdrawal credentials")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// EigenPod contract address
    #[arg(long, env = "POD_ADDRESS", global = true)]
    pub pod_address: Option<String>,

    /// Beacon node URL
    #[arg(long, env = "BEACON_URL", default_value = "http://localhost:5052", global = true)]
    pub beacon_url: String,

    /// Execution client RPC URL
    #[arg(long, env = "RPC_URL", default_value = "http://localhost:8545", global = true)]
    pub rpc_url: String,

    /// Write output to this file instead of stdout
    #[arg(long, global = true)]
    pub out: Option<PathBuf>,

    /// Print JSON where a text rendering exists
    #[arg(long, global = true)]
    pub json: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    pub log_format: LogFormat,

    /// Timeout for each chain read
    #[arg(long, default_value_t = 30, global = true)]
    pub request_timeout_secs: u64,

    /// Timeout for each transaction, including its confirmations
    #[arg(long, default_value_t = 120, global = true)]
    pub tx_timeout_secs: u64,

    /// Retries for transient beacon node failures
    #[arg(long, default_value_t = 3, global = true)]
    pub beacon_retries: usize,

    /// Proof worker threads (defaults to available parallelism)
    #[arg(long, global = true)]
    pub proof_concurrency: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the pod's validators, checkpoint, and projected shares
    Status,
    /// Start a checkpoint if none is active and prove its balances
    Checkpoint(CheckpointArgs),
    /// Prove withdrawal credentials of validators not yet verified
    Credentials(CredentialsArgs),
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Private key that signs and sends transactions
    #[arg(long, env = "SENDER_KEY", hide_env_values = true)]
    pub sender: Option<String>,

    /// Print each batch's call data instead of sending
    #[arg(long)]
    pub print_calldata: bool,

    /// Confirmations to wait for per transaction
    #[arg(long, default_value_t = 1)]
    pub confirmations: u64,
}

#[derive(Args, Debug)]
pub struct CheckpointArgs {
    #[command(flatten)]
    pub submit: SubmitArgs,

    /// Start a checkpoint even if the pod holds no new native ETH
    #[arg(long)]
    pub force: bool,

    /// Balance proofs per transaction
    #[arg(long, default_value_t = 80)]
    pub batch_size: usize,
}

#[derive(Args, Debug)]
pub struct CredentialsArgs {
    #[command(flatten)]
    pub submit: SubmitArgs,

    /// Prove only this validator
    #[arg(long)]
    pub validator_index: Option<u64>,

    /// Validator proofs per transaction
    #[arg(long, default_value_t = 20)]
    pub batch_size: usize,
}

impl GlobalArgs {
    /// # Errors
    /// Fails on a missing or invalid address or URL.
    pub fn to_config(&self) -> Result<ProverConfig, ConfigError> {
        Ok(ProverConfig {
            pod_address: parse_pod_address(self.pod_address.as_deref())?,
            beacon_url: parse_url("beacon", &self.beacon_url)?,
            rpc_url: parse_url("rpc", &self.rpc_url)?,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            tx_timeout: Duration::from_secs(self.tx_timeout_secs),
            beacon_retries: self.beacon_retries,
            proof_concurrency: self
                .proof_concurrency
                .unwrap_or_else(ProofWorkers::default_concurrency),
            output: OutputOptions {
                out: self.out.clone(),
                json: self.json,
            },
        })
    }
}

impl SubmitArgs {
    /// # Errors
    /// Fails on conflicting modes, an invalid key, or a zero batch size.
    pub fn to_options(&self, batch_size: usize) -> Result<SubmitOptions, ConfigError> {
        SubmitOptions::new(
            self.print_calldata,
            self.sender.as_deref(),
            batch_size,
            self.confirmations,
        )
    }
}

impl Command {
    /// Submission options of the subcommand, if it submits anything
    ///
    /// # Errors
    /// See [`SubmitArgs::to_options`].
    pub fn submit_options(&self) -> Result<Option<SubmitOptions>, ConfigError> {
        match self {
            Self::Status => Ok(None),
            Self::Checkpoint(args) => args.submit.to_options(args.batch_size).map(Some),
            Self::Credentials(args) => args.submit.to_options(args.batch_size).map(Some),
        }
    }
}
