//! Validated run configuration.
//!
//! Every flag is folded into these values before any network call is made.

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use reqwest::Url;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("--sender and --print-calldata are mutually exclusive")]
    ConflictingModes,

    #[error("Missing pod address (--pod-address or POD_ADDRESS)")]
    MissingPodAddress,

    #[error("Invalid pod address {0}")]
    InvalidAddress(String),

    #[error("Invalid sender key")]
    InvalidKey,

    #[error("Invalid {name} URL {url}: {reason}")]
    InvalidUrl {
        name: &'static str,
        url: String,
        reason: String,
    },

    #[error("Batch size must be at least 1")]
    ZeroBatchSize,
}

/// Key used to sign pod transactions
#[derive(Clone)]
pub struct Signer(PrivateKeySigner);

impl Signer {
    /// Parse a hex private key, with or without `0x`.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidKey`]; the key itself is never echoed.
    pub fn from_hex(key: &str) -> Result<Self, ConfigError> {
        let key = key.trim();
        let key = key.strip_prefix("0x").unwrap_or(key);
        key.parse::<PrivateKeySigner>()
            .map(Self)
            .map_err(|_| ConfigError::InvalidKey)
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.0.address()
    }

    #[must_use]
    pub fn inner(&self) -> &PrivateKeySigner {
        &self.0
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signer({})", self.address())
    }
}

/// What to do with built proofs
#[derive(Debug, Clone)]
pub enum SubmissionMode {
    /// Sign and send one transaction per batch
    Send(Signer),
    /// Compute call data per batch, send nothing
    SimulateOnly,
}

impl SubmissionMode {
    /// `None` means proofs are only written out.
    ///
    /// # Errors
    /// Fails if both a sender and simulation are requested, or the key is invalid.
    pub fn from_flags(simulate: bool, sender: Option<&str>) -> Result<Option<Self>, ConfigError> {
        match (simulate, sender) {
            (true, Some(_)) => Err(ConfigError::ConflictingModes),
            (true, None) => Ok(Some(Self::SimulateOnly)),
            (false, Some(key)) => Signer::from_hex(key).map(|s| Some(Self::Send(s))),
            (false, None) => Ok(None),
        }
    }
}

/// Per-command submission settings
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    pub mode: Option<SubmissionMode>,
    pub batch_size: usize,
    pub confirmations: u64,
}

impl SubmitOptions {
    /// # Errors
    /// Fails on conflicting modes, an invalid key, or a zero batch size.
    pub fn new(
        simulate: bool,
        sender: Option<&str>,
        batch_size: usize,
        confirmations: u64,
    ) -> Result<Self, ConfigError> {
        if batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(Self {
            mode: SubmissionMode::from_flags(simulate, sender)?,
            batch_size,
            confirmations,
        })
    }
}

/// Where and how command output is written
#[derive(Debug, Clone, Default)]
pub struct OutputOptions {
    /// File to write to instead of stdout
    pub out: Option<PathBuf>,
    /// JSON instead of text where both exist
    pub json: bool,
}

/// Immutable configuration for one invocation
#[derive(Debug, Clone)]
pub struct ProverConfig {
    pub pod_address: Address,
    pub beacon_url: Url,
    pub rpc_url: Url,
    pub request_timeout: Duration,
    pub tx_timeout: Duration,
    pub beacon_retries: usize,
    pub proof_concurrency: usize,
    pub output: OutputOptions,
}

/// Parse a pod address, which is required by every command.
///
/// # Errors
/// Fails if missing or not a 20 byte hex address.
pub fn parse_pod_address(raw: Option<&str>) -> Result<Address, ConfigError> {
    let raw = raw.ok_or(ConfigError::MissingPodAddress)?.trim();
    raw.parse()
        .map_err(|_| ConfigError::InvalidAddress(raw.to_string()))
}

/// # Errors
/// Fails unless `raw` is an absolute http(s) URL.
pub fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        name,
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme {other}"))),
    }
}
