//! JSON-RPC client for the Zano node
//!
//! Provides:
//! - The [`ChainSource`] seam the sync engine and stats refresher read through
//! - An HTTP implementation with request/connect timeouts
//! - Retry logic with jittered exponential backoff (disabled by default; the
//!   scheduler tick is the outer retry loop)

use crate::types::{
    AliasDetailsResult, AssetsListParams, AssetsListResult, BlocksDetailsParams,
    BlocksDetailsResult, GetInfoParams, GetInfoResult, HeightResponse, JsonRpcRequest,
    JsonRpcResponse, NoParams, RawBlock, RawTransaction, StakingSnapshot, TxDetailsParams,
    TxDetailsResult,
};
use crate::{Error, Result};
use async_trait::async_trait;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Default node endpoint
pub const DEFAULT_NODE_URL: &str = "http://127.0.0.1:11211";

/// `getinfo` flags requesting every optional section
pub const GETINFO_ALL_FLAGS: u64 = 1_048_575;

/// Page size for `get_assets_list`
pub const ASSET_PAGE_SIZE: u64 = 100;

/// Upper bound on asset pages walked in one count
const MAX_ASSET_PAGES: u64 = 100_000;

/// Read-only view of the chain the sync pipeline depends on.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Number of blocks on the chain (top height + 1)
    async fn current_height(&self) -> Result<u64>;

    /// Up to `count` blocks starting at `from_height`, transactions included.
    /// Near the tip the node may return fewer.
    async fn block_range(&self, from_height: u64, count: u64) -> Result<Vec<RawBlock>>;

    /// Full details for one transaction
    async fn tx_details(&self, tx_id: &str) -> Result<RawTransaction>;

    /// Registered alias count
    async fn alias_count(&self) -> Result<u64>;

    /// Every registered alias name
    async fn alias_names(&self) -> Result<Vec<String>>;

    /// Registered asset count
    async fn asset_count(&self) -> Result<u64>;

    /// Staking inputs for the APY estimate
    async fn staking_snapshot(&self) -> Result<StakingSnapshot>;
}

/// Retry configuration for network operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum attempts per call (1 = no retry)
    pub max_attempts: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

/// Node client configuration
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    /// Node base URL
    pub endpoint: String,
    /// Whole-request timeout
    pub request_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Retry policy
    pub retry: RetryConfig,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_NODE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
        }
    }
}

impl RpcClientConfig {
    /// Check values before building a client
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::Config("node endpoint is empty".to_string()));
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(Error::Config(format!(
                "node endpoint must be http(s): {}",
                self.endpoint
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config("request timeout must be positive".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Strip trailing slashes and a trailing `/json_rpc` path segment.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    let base = trimmed.strip_suffix("/json_rpc").unwrap_or(trimmed);
    base.trim_end_matches('/').to_string()
}

/// HTTP JSON-RPC client
pub struct RpcClient {
    config: RpcClientConfig,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Client for `endpoint` with default timeouts
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Self::with_config(RpcClientConfig {
            endpoint: endpoint.into(),
            ..Default::default()
        })
    }

    /// Client from a full configuration
    pub fn with_config(mut config: RpcClientConfig) -> Result<Self> {
        config.validate()?;
        config.endpoint = normalize_endpoint(&config.endpoint);

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http,
            next_id: AtomicU64::new(1),
        })
    }

    /// Normalized node base URL
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    fn json_rpc_url(&self) -> String {
        format!("{}/json_rpc", self.config.endpoint)
    }

    /// Call a JSON-RPC 2.0 method
    async fn call<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize + Send + Sync,
        R: DeserializeOwned + Send,
    {
        let params = &params;
        self.with_retry(|| self.call_once(method, params)).await
    }

    async fn call_once<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + Send + Sync,
        R: DeserializeOwned + Send,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!("RPC {} -> {}", method, self.config.endpoint);

        let response = self
            .http
            .post(self.json_rpc_url())
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;
        let envelope: JsonRpcResponse<R> = serde_json::from_slice(&body)?;

        if let Some(err) = envelope.error {
            return Err(Error::RpcUnavailable(format!(
                "{} failed: {} ({})",
                method, err.message, err.code
            )));
        }
        envelope
            .result
            .ok_or_else(|| Error::RpcUnavailable(format!("{} returned no result", method)))
    }

    /// Execute operation with retry
    async fn with_retry<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = Result<T>> + Send,
    {
        let mut attempt = 0;
        let mut backoff = self.config.retry.initial_backoff;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.config.retry.max_attempts {
                        return Err(e);
                    }

                    warn!(
                        "RPC call failed (attempt {}), retrying in {:?}: {}",
                        attempt, backoff, e
                    );

                    tokio::time::sleep(jitter_duration(backoff)).await;

                    backoff = std::cmp::min(
                        Duration::from_millis(
                            (backoff.as_millis() as f64 * self.config.retry.backoff_multiplier)
                                as u64,
                        ),
                        self.config.retry.max_backoff,
                    );
                }
            }
        }
    }

    async fn get_info(&self) -> Result<GetInfoResult> {
        self.call(
            "getinfo",
            GetInfoParams {
                flags: GETINFO_ALL_FLAGS,
            },
        )
        .await
    }
}

#[async_trait]
impl ChainSource for RpcClient {
    async fn current_height(&self) -> Result<u64> {
        let url = format!("{}/getheight", self.config.endpoint);
        let (http, url) = (&self.http, url.as_str());
        let response: HeightResponse = self
            .with_retry(|| async move {
                let body = http
                    .post(url)
                    .send()
                    .await?
                    .error_for_status()?
                    .bytes()
                    .await?;
                Ok(serde_json::from_slice::<HeightResponse>(&body)?)
            })
            .await?;
        Ok(response.height)
    }

    async fn block_range(&self, from_height: u64, count: u64) -> Result<Vec<RawBlock>> {
        let result: BlocksDetailsResult = self
            .call(
                "get_blocks_details",
                BlocksDetailsParams {
                    height_start: from_height,
                    count,
                    ignore_transactions: false,
                },
            )
            .await?;
        debug!(
            "get_blocks_details [{}, +{}) returned {} blocks",
            from_height,
            count,
            result.blocks.len()
        );
        Ok(result.blocks)
    }

    async fn tx_details(&self, tx_id: &str) -> Result<RawTransaction> {
        let result: TxDetailsResult = self
            .call("get_tx_details", TxDetailsParams { tx_hash: tx_id })
            .await?;
        Ok(result.tx_info)
    }

    async fn alias_count(&self) -> Result<u64> {
        self.get_info()
            .await?
            .alias_count
            .ok_or_else(|| Error::RpcUnavailable("getinfo has no alias_count".to_string()))
    }

    async fn alias_names(&self) -> Result<Vec<String>> {
        let result: AliasDetailsResult = self.call("get_all_alias_details", NoParams {}).await?;
        Ok(result.aliases.into_iter().map(|a| a.alias).collect())
    }

    async fn asset_count(&self) -> Result<u64> {
        let mut total = 0u64;
        for page in 0..MAX_ASSET_PAGES {
            let result: AssetsListResult = self
                .call(
                    "get_assets_list",
                    AssetsListParams {
                        offset: page * ASSET_PAGE_SIZE,
                        count: ASSET_PAGE_SIZE,
                    },
                )
                .await?;
            let len = result.assets.len() as u64;
            total += len;
            if len < ASSET_PAGE_SIZE {
                return Ok(total);
            }
        }
        Err(Error::RpcUnavailable(format!(
            "asset list did not end after {} pages",
            MAX_ASSET_PAGES
        )))
    }

    async fn staking_snapshot(&self) -> Result<StakingSnapshot> {
        let info = self.get_info().await?;
        Ok(StakingSnapshot {
            pos_difficulty: parse_amount("pos_difficulty", info.pos_difficulty.as_deref())?,
            total_coins: parse_amount("total_coins", info.total_coins.as_deref())?,
        })
    }
}

fn parse_amount(field: &str, value: Option<&str>) -> Result<f64> {
    let text = value.ok_or_else(|| Error::RpcUnavailable(format!("getinfo has no {}", field)))?;
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Error::RpcUnavailable(format!("getinfo {} is not a number: {}", field, text)))
}

fn jitter_duration(duration: Duration) -> Duration {
    let millis = duration.as_millis() as u64;
    if millis == 0 {
        return duration;
    }
    let jitter = rand::thread_rng().gen_range(0.8..1.2);
    let jittered = (millis as f64 * jitter) as u64;
    Duration::from_millis(jittered.max(1))
}
