//! Node record -> storage record conversion
//!
//! Every function here is total: malformed nested data degrades to an
//! empty or raw-text value instead of failing the batch.

use crate::types::{RawBlock, RawTransaction};
use serde_json::Value;
use zano_storage_sqlite::{BlockRecord, TransactionRecord};

/// Stored when a transaction carries no attachments
pub const EMPTY_ATTACHMENTS: &str = "{}";

/// Clean free text before storage.
///
/// Literal `\uXXXX` escape sequences are turned into the characters they
/// name, NUL characters are removed, and single quotes are doubled.
/// Escapes that would produce a quote, backslash, or control character are
/// left as written so embedded JSON stays parseable; `\u0000` is dropped.
pub fn sanitize_text(input: &str) -> String {
    let decoded = decode_unicode_escapes(input);
    let mut out = String::with_capacity(decoded.len());
    for c in decoded.chars() {
        match c {
            '\0' => {}
            '\'' => out.push_str("''"),
            other => out.push(other),
        }
    }
    out
}

fn decode_unicode_escapes(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    let mut literal_start = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' || bytes.get(i + 1) != Some(&b'u') {
            i += 1;
            continue;
        }
        let Some(unit) = hex4(bytes, i + 2) else {
            i += 1;
            continue;
        };

        // Surrogate pairs arrive as two consecutive escapes
        let (decoded, consumed) = if (0xD800..0xDC00).contains(&unit) {
            match low_surrogate_at(bytes, i + 6) {
                Some(low) => {
                    let code = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
                    (char::from_u32(code), 12)
                }
                None => (None, 6),
            }
        } else {
            (char::from_u32(unit), 6)
        };

        out.push_str(&input[literal_start..i]);
        match decoded {
            Some('\0') => {}
            Some(c) if c == '"' || c == '\\' || c.is_control() => {
                out.push_str(&input[i..i + consumed]);
            }
            Some(c) => out.push(c),
            None => out.push_str(&input[i..i + consumed]),
        }
        i += consumed;
        literal_start = i;
    }

    out.push_str(&input[literal_start..]);
    out
}

fn hex4(bytes: &[u8], at: usize) -> Option<u32> {
    let digits = bytes.get(at..at + 4)?;
    let text = std::str::from_utf8(digits).ok()?;
    if !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(text, 16).ok()
}

fn low_surrogate_at(bytes: &[u8], at: usize) -> Option<u32> {
    if bytes.get(at) != Some(&b'\\') || bytes.get(at + 1) != Some(&b'u') {
        return None;
    }
    hex4(bytes, at + 2).filter(|u| (0xDC00..0xE000).contains(u))
}

/// Node timestamps are seconds; stored timestamps are milliseconds.
pub fn seconds_to_millis(seconds: i64) -> i64 {
    seconds.saturating_mul(1000)
}

/// Structured payload field as sanitized JSON text
fn payload_text(value: &Value) -> String {
    sanitize_text(&value.to_string())
}

/// Convert a node block into its storage row.
pub fn to_block_record(raw: &RawBlock) -> BlockRecord {
    BlockRecord {
        block_id: raw.id.clone(),
        height: raw.height,
        cumulative_size: raw.block_cumulative_size.clone(),
        txs_count: u32::try_from(raw.transactions_details.len()).unwrap_or(u32::MAX),
        total_fee: raw
            .total_fee
            .as_deref()
            .map(str::trim)
            .filter(|fee| !fee.is_empty())
            .unwrap_or("0")
            .to_string(),
        timestamp: seconds_to_millis(raw.timestamp),
        actual_timestamp: raw.actual_timestamp.map(seconds_to_millis),
        base_reward: raw.base_reward.clone(),
        difficulty: raw.difficulty.clone(),
        cumulative_diff_adjusted: raw.cumulative_diff_adjusted.clone(),
        cumulative_diff_precise: raw.cumulative_diff_precise.clone(),
        effective_fee_median: raw.effective_fee_median.clone(),
        is_orphan: raw.is_orphan,
        penalty: raw.penalty.clone(),
        prev_id: raw.prev_id.clone(),
        summary_reward: raw.summary_reward.clone(),
        this_block_fee_median: raw.this_block_fee_median.clone(),
        total_txs_size: raw.total_txs_size.clone(),
        block_type: raw.block_type.clone(),
        miner_text_info: raw.miner_text_info.as_deref().map(sanitize_text),
        pow_seed: raw.pow_seed.clone(),
        already_generated_coins: raw.already_generated_coins.clone(),
        object_in_json: raw.object_in_json.as_deref().map(sanitize_text),
    }
}

/// Convert a node transaction into its storage row.
///
/// `keeper_block` must already be set; see [`txs_from_blocks`].
pub fn to_tx_record(raw: &RawTransaction) -> TransactionRecord {
    TransactionRecord {
        tx_id: raw.id.clone(),
        keeper_block: raw.keeper_block.unwrap_or_default(),
        timestamp: seconds_to_millis(raw.timestamp),
        amount: raw.amount.clone(),
        blob_size: raw.blob_size.clone(),
        fee: raw.fee.clone(),
        pub_key: raw.pub_key.clone(),
        ins: raw.ins.as_ref().map(payload_text),
        outs: raw.outs.as_ref().map(payload_text),
        extra: raw.extra.as_ref().map(payload_text),
        attachments: Some(
            raw.attachments
                .as_ref()
                .map(payload_text)
                .unwrap_or_else(|| EMPTY_ATTACHMENTS.to_string()),
        ),
    }
}

/// Flatten the transactions embedded in `blocks`, filling in the keeper
/// height from the containing block when the node left it out. Entries
/// without an id are skipped.
pub fn txs_from_blocks(blocks: &[RawBlock]) -> Vec<RawTransaction> {
    blocks
        .iter()
        .flat_map(|block| {
            block
                .transactions_details
                .iter()
                .filter(|tx| !tx.id.is_empty())
                .map(move |tx| {
                    let mut tx = tx.clone();
                    if tx.keeper_block.is_none() {
                        tx.keeper_block = Some(block.height);
                    }
                    tx
                })
        })
        .collect()
}
