//! Wire types for the node's JSON-RPC interface
//!
//! The node is loose about scalar encoding: heights, sizes, and amounts may
//! arrive as JSON numbers or as decimal strings depending on the daemon
//! version. The field helpers below accept both. Apart from a block's
//! height, a value that cannot be read at all is dropped instead of failing
//! the whole response.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Block exactly as reported by `get_blocks_details`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawBlock {
    /// Block hash
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    /// Chain height
    #[serde(deserialize_with = "lenient_u64")]
    pub height: u64,
    /// Cumulative block size
    #[serde(deserialize_with = "lenient_text")]
    pub block_cumulative_size: Option<String>,
    /// Total fee in atomic units
    #[serde(deserialize_with = "lenient_text")]
    pub total_fee: Option<String>,
    /// Seconds since epoch
    #[serde(deserialize_with = "lenient_i64")]
    pub timestamp: i64,
    /// Miner-reported seconds since epoch
    #[serde(deserialize_with = "lenient_opt_i64")]
    pub actual_timestamp: Option<i64>,
    /// Base reward
    #[serde(deserialize_with = "lenient_text")]
    pub base_reward: Option<String>,
    /// Difficulty
    #[serde(deserialize_with = "lenient_text")]
    pub difficulty: Option<String>,
    /// Adjusted cumulative difficulty
    #[serde(deserialize_with = "lenient_text")]
    pub cumulative_diff_adjusted: Option<String>,
    /// Precise cumulative difficulty
    #[serde(deserialize_with = "lenient_text")]
    pub cumulative_diff_precise: Option<String>,
    /// Effective fee median
    #[serde(deserialize_with = "lenient_text")]
    pub effective_fee_median: Option<String>,
    /// Orphan flag
    #[serde(deserialize_with = "lenient_opt_bool")]
    pub is_orphan: Option<bool>,
    /// Block size penalty
    #[serde(deserialize_with = "lenient_text")]
    pub penalty: Option<String>,
    /// Previous block hash
    #[serde(deserialize_with = "lenient_text")]
    pub prev_id: Option<String>,
    /// Summary reward
    #[serde(deserialize_with = "lenient_text")]
    pub summary_reward: Option<String>,
    /// Fee median of this block
    #[serde(deserialize_with = "lenient_text")]
    pub this_block_fee_median: Option<String>,
    /// Total size of block transactions
    #[serde(deserialize_with = "lenient_text")]
    pub total_txs_size: Option<String>,
    /// PoW / PoS marker
    #[serde(rename = "type", deserialize_with = "lenient_text")]
    pub block_type: Option<String>,
    /// Free text left by the miner
    #[serde(deserialize_with = "lenient_text")]
    pub miner_text_info: Option<String>,
    /// PoW seed
    #[serde(deserialize_with = "lenient_text")]
    pub pow_seed: Option<String>,
    /// Coins emitted up to this block
    #[serde(deserialize_with = "lenient_text")]
    pub already_generated_coins: Option<String>,
    /// Opaque extension payload; objects are kept as their JSON text
    #[serde(deserialize_with = "lenient_text")]
    pub object_in_json: Option<String>,
    /// Embedded transactions
    #[serde(deserialize_with = "null_as_default")]
    pub transactions_details: Vec<RawTransaction>,
}

/// Transaction as reported inside a block or by `get_tx_details`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTransaction {
    /// Transaction hash
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    /// Height of the containing block
    #[serde(deserialize_with = "lenient_opt_u64")]
    pub keeper_block: Option<u64>,
    /// Seconds since epoch
    #[serde(deserialize_with = "lenient_i64")]
    pub timestamp: i64,
    /// Amount
    #[serde(deserialize_with = "lenient_text")]
    pub amount: Option<String>,
    /// Serialized size
    #[serde(deserialize_with = "lenient_text")]
    pub blob_size: Option<String>,
    /// Fee
    #[serde(deserialize_with = "lenient_text")]
    pub fee: Option<String>,
    /// Transaction public key
    #[serde(deserialize_with = "lenient_text")]
    pub pub_key: Option<String>,
    /// Inputs
    pub ins: Option<Value>,
    /// Outputs
    pub outs: Option<Value>,
    /// Extra fields
    pub extra: Option<Value>,
    /// Attachments
    pub attachments: Option<Value>,
}

impl RawTransaction {
    /// True when the node delivered none of the structured payload.
    pub fn is_missing_payload(&self) -> bool {
        self.ins.is_none() && self.outs.is_none() && self.extra.is_none() && self.attachments.is_none()
    }

    /// Take payload fields from a detailed copy of the same transaction.
    pub fn merge_payload(&mut self, detailed: RawTransaction) {
        if self.ins.is_none() {
            self.ins = detailed.ins;
        }
        if self.outs.is_none() {
            self.outs = detailed.outs;
        }
        if self.extra.is_none() {
            self.extra = detailed.extra;
        }
        if self.attachments.is_none() {
            self.attachments = detailed.attachments;
        }
    }
}

/// Staking inputs taken from `getinfo`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StakingSnapshot {
    /// Current proof-of-stake difficulty
    pub pos_difficulty: f64,
    /// Total coin supply in atomic units
    pub total_coins: f64,
}

/// JSON-RPC 2.0 request envelope
#[derive(Debug, Serialize)]
pub(crate) struct JsonRpcRequest<'a, P: Serialize> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: P,
}

/// JSON-RPC 2.0 response envelope
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "R: Deserialize<'de>"))]
pub(crate) struct JsonRpcResponse<R> {
    #[serde(default)]
    pub result: Option<R>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HeightResponse {
    #[serde(deserialize_with = "lenient_u64")]
    pub height: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct BlocksDetailsParams {
    pub height_start: u64,
    pub count: u64,
    pub ignore_transactions: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct BlocksDetailsResult {
    #[serde(deserialize_with = "null_as_default")]
    pub blocks: Vec<RawBlock>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TxDetailsParams<'a> {
    pub tx_hash: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TxDetailsResult {
    pub tx_info: RawTransaction,
}

#[derive(Debug, Serialize)]
pub(crate) struct GetInfoParams {
    pub flags: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct GetInfoResult {
    #[serde(deserialize_with = "lenient_opt_u64")]
    pub alias_count: Option<u64>,
    #[serde(deserialize_with = "lenient_text")]
    pub pos_difficulty: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub total_coins: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AssetsListParams {
    pub offset: u64,
    pub count: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AssetsListResult {
    #[serde(deserialize_with = "null_as_default")]
    pub assets: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AliasDetailsResult {
    #[serde(deserialize_with = "null_as_default")]
    pub aliases: Vec<AliasEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AliasEntry {
    pub alias: String,
}

/// Empty params object
#[derive(Debug, Serialize)]
pub(crate) struct NoParams {}

fn scalar_to_u64<E: de::Error>(value: &Value) -> Result<Option<u64>, E> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .map(Some)
            .ok_or_else(|| E::custom(format!("expected unsigned integer, got {}", n))),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| E::custom(format!("expected unsigned integer, got {:?}", s))),
        other => Err(E::custom(format!("expected unsigned integer, got {}", other))),
    }
}

fn scalar_to_i64<E: de::Error>(value: &Value) -> Result<Option<i64>, E> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|v| i64::try_from(v).unwrap_or(i64::MAX)))
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| E::custom(format!("expected integer, got {}", n))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| E::custom(format!("expected integer, got {:?}", s))),
        other => Err(E::custom(format!("expected integer, got {}", other))),
    }
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_u64(&value)?.unwrap_or_default())
}

fn lenient_opt_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_u64::<D::Error>(&value).unwrap_or_else(|e| {
        tracing::debug!("Ignoring unreadable field: {}", e);
        None
    }))
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(lenient_opt_i64(deserializer)?.unwrap_or_default())
}

fn lenient_opt_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_i64::<D::Error>(&value).unwrap_or_else(|e| {
        tracing::debug!("Ignoring unreadable field: {}", e);
        None
    }))
}

/// `true`/`false`, `0`/`1`, or their string forms; anything else is `None`.
fn lenient_opt_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match &value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_u64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(lenient_text(deserializer)?.unwrap_or_default())
}

/// Any scalar as text; objects and arrays as their JSON text.
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
