//! Database models

use serde::Serialize;

/// Block row. `height` is the external identity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlockRecord {
    /// Block hash
    pub block_id: String,
    /// Chain height
    pub height: u64,
    /// Cumulative block size (decimal text)
    pub cumulative_size: Option<String>,
    /// Number of transactions carried by the block
    pub txs_count: u32,
    /// Total fee in atomic units (decimal text, u128-safe)
    pub total_fee: String,
    /// Block timestamp in milliseconds since epoch
    pub timestamp: i64,
    /// Miner-reported timestamp in milliseconds since epoch
    pub actual_timestamp: Option<i64>,
    /// Base reward
    pub base_reward: Option<String>,
    /// Difficulty
    pub difficulty: Option<String>,
    /// Adjusted cumulative difficulty
    pub cumulative_diff_adjusted: Option<String>,
    /// Precise cumulative difficulty
    pub cumulative_diff_precise: Option<String>,
    /// Effective fee median
    pub effective_fee_median: Option<String>,
    /// Orphan flag
    pub is_orphan: Option<bool>,
    /// Block size penalty
    pub penalty: Option<String>,
    /// Previous block hash
    pub prev_id: Option<String>,
    /// Summary reward
    pub summary_reward: Option<String>,
    /// Fee median of this block
    pub this_block_fee_median: Option<String>,
    /// Total size of block transactions
    pub total_txs_size: Option<String>,
    /// PoW / PoS marker
    pub block_type: Option<String>,
    /// Free text left by the miner (sanitized)
    pub miner_text_info: Option<String>,
    /// PoW seed
    pub pow_seed: Option<String>,
    /// Coins emitted up to this block
    pub already_generated_coins: Option<String>,
    /// Opaque extension payload carried through unmodified
    pub object_in_json: Option<String>,
}

/// Transaction row. `tx_id` is the external identity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransactionRecord {
    /// Transaction hash
    pub tx_id: String,
    /// Height of the containing block (by value)
    pub keeper_block: u64,
    /// Timestamp in milliseconds since epoch
    pub timestamp: i64,
    /// Amount
    pub amount: Option<String>,
    /// Serialized size
    pub blob_size: Option<String>,
    /// Fee
    pub fee: Option<String>,
    /// Transaction public key
    pub pub_key: Option<String>,
    /// Serialized inputs
    pub ins: Option<String>,
    /// Serialized outputs
    pub outs: Option<String>,
    /// Serialized extra
    pub extra: Option<String>,
    /// Serialized attachments
    pub attachments: Option<String>,
}

impl TransactionRecord {
    /// True when none of the structured payload columns are populated.
    pub fn is_missing_payload(&self) -> bool {
        self.ins.is_none() && self.outs.is_none() && self.extra.is_none()
    }
}

/// Payload columns filled in after the fact for a transaction row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransactionPayload {
    /// Serialized inputs
    pub ins: Option<String>,
    /// Serialized outputs
    pub outs: Option<String>,
    /// Serialized extra
    pub extra: Option<String>,
    /// Serialized attachments
    pub attachments: Option<String>,
}

/// Singleton sync cursor with the last known good derived statistics
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SyncCursor {
    /// Number of contiguous blocks persisted from height 0
    pub db_height: u64,
    /// Registered alias count
    pub alias_count: u64,
    /// Registered asset count
    pub assets_count: u64,
    /// Aliases linked to a matrix account
    pub matrix_alias_count: u64,
    /// Short (premium) alias count
    pub premium_alias_count: u64,
    /// Estimated staked coins
    pub staked_coins: f64,
    /// Estimated staked share of supply, percent
    pub staked_percentage: f64,
    /// Estimated staking APY, percent
    pub apy: f64,
    /// Burned fees since fee burning began, whole coins
    pub burned_total: f64,
    /// Last cursor update (RFC 3339)
    pub updated_at: String,
    /// Last derived stats update (RFC 3339)
    pub stats_updated_at: Option<String>,
}

/// Partial update of the derived counters. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DerivedStats {
    /// Registered alias count
    pub alias_count: Option<u64>,
    /// Registered asset count
    pub assets_count: Option<u64>,
    /// Aliases linked to a matrix account
    pub matrix_alias_count: Option<u64>,
    /// Short (premium) alias count
    pub premium_alias_count: Option<u64>,
    /// Estimated staked coins
    pub staked_coins: Option<f64>,
    /// Estimated staked share of supply, percent
    pub staked_percentage: Option<f64>,
    /// Estimated staking APY, percent
    pub apy: Option<f64>,
    /// Burned fees, whole coins
    pub burned_total: Option<f64>,
}

impl DerivedStats {
    /// True when no field resolved.
    pub fn is_empty(&self) -> bool {
        *self == DerivedStats::default()
    }
}
