//! Pod Prover
//!
//! Proves EigenPod withdrawal credentials and checkpoints against the beacon
//! chain, and prints, simulates, or submits the proofs.

use clap::Parser;
use pod_prover::cli::{Cli, Command, LogFormat};
use pod_prover::commands::{checkpoint, credentials, status};
use pod_prover::contract::{EigenPodContract, RpcClient};
use pod_prover::{write_output, ProverContext, ProverError};
use pod_proofs::{BeaconClient, ProofWorkers};
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const BEACON_RETRY_DELAY: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment from .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.global.log_format) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Received interrupt, stopping after the current step");
                cancel.cancel();
            }
        }
    });

    match run(cli, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e.exit_code();
            error!(error = %e, exit_code = code, "pod-prover failed");
            ExitCode::from(code)
        }
    }
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?,
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()?,
    }
    Ok(())
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<(), ProverError> {
    let config = cli.global.to_config()?;
    let options = cli.command.submit_options()?;
    info!(pod = %config.pod_address, beacon_url = %config.beacon_url, "Starting pod-prover");

    let beacon = BeaconClient::new(config.beacon_url.as_str())
        .with_timeout(config.request_timeout)?
        .with_retries(config.beacon_retries, BEACON_RETRY_DELAY);
    let rpc = RpcClient::new(config.rpc_url.clone());
    let pod = EigenPodContract::new(config.pod_address, rpc.provider().clone());
    let workers = ProofWorkers::new(config.proof_concurrency)?;

    let ctx = ProverContext {
        config: &config,
        beacon: &beacon,
        execution: &rpc,
        pod: &pod,
        workers: &workers,
        cancel,
    };

    let mut output = match (&cli.command, options) {
        (Command::Checkpoint(args), Some(options)) => {
            checkpoint::run(&ctx, &options, args.force).await?
        }
        (Command::Credentials(args), Some(options)) => {
            credentials::run(&ctx, &options, args.validator_index).await?
        }
        _ => status::run(&ctx).await?,
    };

    write_output(&output, &config.output)?;
    match output.take_error() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
