//! Beacon API HTTP Client
//!
//! Fetches block headers and SSZ-encoded states from a beacon node and turns
//! them into [`BeaconStateSnapshot`]s. Transient failures (connection errors,
//! timeouts, 5xx and 429 responses) are retried with exponential backoff.

use crate::beacon_state::{BeaconState, StateDecodeError};
use crate::snapshot::{BeaconStateSnapshot, SnapshotError};
use crate::types::BeaconBlockHeader;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

const CONSENSUS_VERSION_HEADER: &str = "Eth-Consensus-Version";
const DEFAULT_RETRIES: usize = 3;
const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(500);
const MAX_DELAY: Duration = Duration::from_secs(10);

/// Errors from beacon API operations
#[derive(Debug, Error)]
pub enum BeaconClientError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Beacon node returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Decode(#[from] StateDecodeError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

impl BeaconClientError {
    /// Whether retrying the request may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Block to read a header and state at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateId {
    Head,
    Finalized,
    Slot(u64),
    BlockRoot([u8; 32]),
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Head => f.write_str("head"),
            Self::Finalized => f.write_str("finalized"),
            Self::Slot(slot) => write!(f, "{slot}"),
            Self::BlockRoot(root) => write!(f, "0x{}", hex::encode(root)),
        }
    }
}

/// Source of proof-ready beacon state snapshots
#[async_trait]
pub trait BeaconApi: Send + Sync {
    /// Fetch the header and state at `state_id` and build a snapshot.
    ///
    /// # Errors
    /// Fails if the node is unreachable, the block is unknown, the fork is
    /// unsupported, or the state does not hash to the header's state root.
    async fn fetch_snapshot(&self, state_id: &StateId)
        -> Result<BeaconStateSnapshot, BeaconClientError>;
}

/// Client for interacting with the Beacon API
#[derive(Debug, Clone)]
pub struct BeaconClient {
    client: Client,
    base_url: String,
    max_retries: usize,
    min_delay: Duration,
}

impl BeaconClient {
    /// Create a new beacon client
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the beacon node (e.g., `http://localhost:5052`)
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_retries: DEFAULT_RETRIES,
            min_delay: DEFAULT_MIN_DELAY,
        }
    }

    /// Bound every request by `timeout`.
    ///
    /// # Errors
    /// Fails if the HTTP client cannot be built.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, BeaconClientError> {
        self.client = Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// Retry transient failures up to `max_retries` times, backing off from `min_delay`.
    #[must_use]
    pub fn with_retries(mut self, max_retries: usize, min_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.min_delay = min_delay;
        self
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_factor(2.0)
            .with_min_delay(self.min_delay)
            .with_max_delay(MAX_DELAY.max(self.min_delay))
            .with_max_times(self.max_retries)
    }

    /// Fetch beacon block header
    ///
    /// # Errors
    /// Returns error if the request fails or header is not found
    #[instrument(skip(self), fields(block_id = %block_id))]
    pub async fn get_header(
        &self,
        block_id: &StateId,
    ) -> Result<BeaconBlockHeader, BeaconClientError> {
        (|| self.request_header(block_id))
            .retry(self.backoff())
            .when(BeaconClientError::is_transient)
            .notify(|err, dur| {
                warn!(%err, ?dur, "Retrying beacon header request");
            })
            .await
    }

    /// Fetch the beacon state with root `state_root` as SSZ bytes, along with
    /// the fork named by the node.
    ///
    /// # Errors
    /// Returns error if the request fails or state is not found
    #[instrument(skip_all, fields(state_root = %hex::encode(state_root)))]
    pub async fn get_state_ssz(
        &self,
        state_root: &[u8; 32],
    ) -> Result<(String, Vec<u8>), BeaconClientError> {
        (|| self.request_state(state_root))
            .retry(self.backoff())
            .when(BeaconClientError::is_transient)
            .notify(|err, dur| {
                warn!(%err, ?dur, "Retrying beacon state request");
            })
            .await
    }

    async fn request_header(
        &self,
        block_id: &StateId,
    ) -> Result<BeaconBlockHeader, BeaconClientError> {
        #[derive(Deserialize)]
        struct HeaderResponse {
            data: HeaderData,
        }

        #[derive(Deserialize)]
        struct HeaderData {
            header: HeaderMessage,
        }

        #[derive(Deserialize)]
        struct HeaderMessage {
            message: BeaconBlockHeaderJson,
        }

        #[derive(Deserialize)]
        struct BeaconBlockHeaderJson {
            slot: String,
            proposer_index: String,
            parent_root: String,
            state_root: String,
            body_root: String,
        }

        let url = format!("{}/eth/v1/beacon/headers/{block_id}", self.base_url);
        let response = self.client.get(&url).send().await?;
        check_status(response.status(), &url, || format!("Block {block_id}"))?;

        let header_resp: HeaderResponse = response.json().await?;
        let msg = header_resp.data.header.message;

        Ok(BeaconBlockHeader {
            slot: msg.slot.parse().map_err(|e| {
                BeaconClientError::InvalidResponse(format!("Invalid slot: {e}"))
            })?,
            proposer_index: msg.proposer_index.parse().map_err(|e| {
                BeaconClientError::InvalidResponse(format!("Invalid proposer_index: {e}"))
            })?,
            parent_root: parse_hex32(&msg.parent_root)?,
            state_root: parse_hex32(&msg.state_root)?,
            body_root: parse_hex32(&msg.body_root)?,
        })
    }

    async fn request_state(
        &self,
        state_root: &[u8; 32],
    ) -> Result<(String, Vec<u8>), BeaconClientError> {
        let url = format!(
            "{}/eth/v2/debug/beacon/states/0x{}",
            self.base_url,
            hex::encode(state_root)
        );
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/octet-stream")
            .send()
            .await?;
        check_status(response.status(), &url, || {
            format!("State 0x{}", hex::encode(state_root))
        })?;

        let fork = response
            .headers()
            .get(CONSENSUS_VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                BeaconClientError::InvalidResponse(format!(
                    "Missing {CONSENSUS_VERSION_HEADER} header"
                ))
            })?
            .to_string();

        Ok((fork, response.bytes().await?.to_vec()))
    }
}

#[async_trait]
impl BeaconApi for BeaconClient {
    #[instrument(skip(self), fields(state_id = %state_id))]
    async fn fetch_snapshot(
        &self,
        state_id: &StateId,
    ) -> Result<BeaconStateSnapshot, BeaconClientError> {
        let header = self.get_header(state_id).await?;
        let (fork, bytes) = self.get_state_ssz(&header.state_root).await?;
        info!(slot = header.slot, %fork, bytes = bytes.len(), "Fetched beacon state");

        // decoding and hashing a mainnet state is CPU bound
        tokio::task::spawn_blocking(move || {
            let state = BeaconState::decode(&fork, &bytes)?;
            Ok(state.into_snapshot(header)?)
        })
        .await
        .map_err(|e| BeaconClientError::InvalidResponse(format!("Snapshot task failed: {e}")))?
    }
}

fn check_status(
    status: StatusCode,
    url: &str,
    what: impl FnOnce() -> String,
) -> Result<(), BeaconClientError> {
    if status == StatusCode::NOT_FOUND {
        return Err(BeaconClientError::NotFound(what()));
    }
    if !status.is_success() {
        return Err(BeaconClientError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(())
}

fn parse_hex32(s: &str) -> Result<[u8; 32], BeaconClientError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s)
        .map_err(|e| BeaconClientError::InvalidResponse(format!("Invalid hex: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| BeaconClientError::InvalidResponse("Expected 32 bytes".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacon_state::ElectraBeaconState;
    use serde_json::json;
    use ssz_rs::HashTreeRoot;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn header_json(header: &BeaconBlockHeader) -> serde_json::Value {
        json!({
            "data": {
                "root": format!("0x{}", hex::encode(block_root(header).unwrap())),
                "canonical": true,
                "header": {
                    "message": {
                        "slot": header.slot.to_string(),
                        "proposer_index": header.proposer_index.to_string(),
                        "parent_root": format!("0x{}", hex::encode(header.parent_root)),
                        "state_root": format!("0x{}", hex::encode(header.state_root)),
                        "body_root": format!("0x{}", hex::encode(header.body_root)),
                    },
                    "signature": "0x00"
                }
            }
        })
    }

    fn block_root(header: &BeaconBlockHeader) -> Result<[u8; 32], ssz_rs::MerkleizationError> {
        Ok(header.hash_tree_root()?.into())
    }

    fn client(server: &MockServer) -> BeaconClient {
        BeaconClient::new(server.uri()).with_retries(2, Duration::from_millis(1))
    }

    #[test]
    fn test_parse_hex32() {
        let hex = "0x0102030405060708091011121314151617181920212223242526272829303132";
        let result = parse_hex32(hex).unwrap();
        assert_eq!(result[0], 0x01);
        assert_eq!(result[31], 0x32);
    }

    #[test]
    fn test_parse_hex32_invalid_length() {
        assert!(parse_hex32("0x0102").is_err());
    }

    #[test]
    fn test_state_id_display() {
        assert_eq!(StateId::Head.to_string(), "head");
        assert_eq!(StateId::Slot(12_345).to_string(), "12345");
        assert_eq!(
            StateId::BlockRoot([0xab; 32]).to_string(),
            format!("0x{}", "ab".repeat(32))
        );
    }

    #[tokio::test]
    async fn test_get_header() {
        let server = MockServer::start().await;
        let header = BeaconBlockHeader {
            slot: 9_000_000,
            proposer_index: 17,
            parent_root: [0x01; 32],
            state_root: [0x02; 32],
            body_root: [0x03; 32],
        };
        Mock::given(method("GET"))
            .and(path("/eth/v1/beacon/headers/finalized"))
            .respond_with(ResponseTemplate::new(200).set_body_json(header_json(&header)))
            .expect(1)
            .mount(&server)
            .await;

        let fetched = client(&server).get_header(&StateId::Finalized).await.unwrap();
        assert_eq!(fetched, header);
    }

    #[tokio::test]
    async fn test_missing_header_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eth/v1/beacon/headers/42"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).get_header(&StateId::Slot(42)).await.unwrap_err();
        assert!(matches!(err, BeaconClientError::NotFound(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_unavailable_node_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eth/v1/beacon/headers/head"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server).get_header(&StateId::Head).await.unwrap_err();
        assert!(matches!(err, BeaconClientError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_node() {
        let client = BeaconClient::new("http://127.0.0.1:1").with_retries(0, Duration::from_millis(1));
        let err = client.get_header(&StateId::Head).await.unwrap_err();
        assert!(matches!(err, BeaconClientError::HttpError(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_fetch_snapshot() {
        let state = ElectraBeaconState {
            genesis_time: 1_606_824_023,
            slot: 320,
            ..Default::default()
        };
        let bytes = ssz_rs::serialize(&state).unwrap();
        let header = BeaconBlockHeader {
            slot: 320,
            proposer_index: 5,
            parent_root: [0x01; 32],
            state_root: state.hash_tree_root().unwrap().into(),
            body_root: [0x02; 32],
        };

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eth/v1/beacon/headers/320"))
            .respond_with(ResponseTemplate::new(200).set_body_json(header_json(&header)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!(
                "/eth/v2/debug/beacon/states/0x{}",
                hex::encode(header.state_root)
            )))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(CONSENSUS_VERSION_HEADER, "electra")
                    .set_body_bytes(bytes),
            )
            .mount(&server)
            .await;

        let snapshot = client(&server).fetch_snapshot(&StateId::Slot(320)).await.unwrap();
        assert_eq!(snapshot.slot(), 320);
        assert_eq!(snapshot.block_root(), block_root(&header).unwrap());
        assert_eq!(snapshot.timestamp(), 1_606_824_023 + 320 * 12);
    }

    #[tokio::test]
    async fn test_pre_electra_state_is_rejected() {
        let header = BeaconBlockHeader {
            state_root: [0x09; 32],
            ..Default::default()
        };
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eth/v1/beacon/headers/head"))
            .respond_with(ResponseTemplate::new(200).set_body_json(header_json(&header)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/eth/v2/debug/beacon/states/0x{}", "09".repeat(32))))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(CONSENSUS_VERSION_HEADER, "deneb")
                    .set_body_bytes(vec![0u8; 64]),
            )
            .mount(&server)
            .await;

        let err = client(&server).fetch_snapshot(&StateId::Head).await.unwrap_err();
        assert!(matches!(
            err,
            BeaconClientError::Decode(StateDecodeError::UnsupportedFork(_))
        ));
    }
}
