//! On-disk layout of the index: dual keying by height and by block hash.
//!
//! Byte-exact layout:
//!
//! - `0x74 ('t') || height (u32 BE)` → `block_hash (32) || snapshot`
//! - `0x73 ('s') || block_hash (32)` → `snapshot` (written only for blocks
//!   evicted from the height lane by a reorg)
//! - `0x4D ('M')` → live group element, little-endian
//!
//! Records are never deleted; the height lane is overwritten in place.

use crate::error::{Error, Result};
use bitcoin::BlockHash;
use bitcoin::hashes::Hash;

const HEIGHT_PREFIX: u8 = b't';
const HASH_PREFIX: u8 = b's';

/// Key of the live group element.
pub const MUSET_KEY: [u8; 1] = [b'M'];

/// Key of the per-height record. Big-endian so the lane iterates in height
/// order.
pub fn height_key(height: u32) -> [u8; 5] {
    let mut key = [0u8; 5];
    key[0] = HEIGHT_PREFIX;
    key[1..].copy_from_slice(&height.to_be_bytes());
    key
}

/// Key of the per-block-hash record.
pub fn hash_key(block_hash: &BlockHash) -> [u8; 33] {
    let mut key = [0u8; 33];
    key[0] = HASH_PREFIX;
    key[1..].copy_from_slice(block_hash.as_byte_array());
    key
}

/// Value totals for provably unspendable outputs, carried only by the
/// extended snapshot variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnspendableTotals {
    /// Subsidy and fees the miner left unclaimed.
    pub unclaimed_rewards: i64,
    /// Value burned into OP_RETURN outputs.
    pub op_return: i64,
    /// Value locked behind scripts past the consensus size limit.
    pub big_script: i64,
}

/// Per-block summary of the UTXO set: digest tag plus running aggregates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// 32-byte tag of the multiset digest as of this block.
    pub digest: [u8; 32],
    /// Count of unspent outputs.
    pub tx_outputs: u64,
    /// Synthetic byte volume of the set.
    pub bogo_size: u64,
    /// Sum of values of unspent outputs, in satoshis.
    pub total_amount: i64,
    /// Last reported size of the backing coins store.
    pub disk_size: u64,
    /// Extended variant only; readers tolerate absence.
    pub unspendables: Option<UnspendableTotals>,
}

const BASE_LEN: usize = 32 + 8 + 8 + 8 + 8;
const EXTENDED_LEN: usize = BASE_LEN + 3 * 8;

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(bytes[at..at + 8].try_into().expect("bounds checked; qed"))
}

fn read_i64(bytes: &[u8], at: usize) -> i64 {
    i64::from_le_bytes(bytes[at..at + 8].try_into().expect("bounds checked; qed"))
}

impl Snapshot {
    /// Serialize, all integers little-endian. The unspendable extension is
    /// appended only when present.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(EXTENDED_LEN);
        out.extend_from_slice(&self.digest);
        out.extend_from_slice(&self.tx_outputs.to_le_bytes());
        out.extend_from_slice(&self.bogo_size.to_le_bytes());
        out.extend_from_slice(&self.total_amount.to_le_bytes());
        out.extend_from_slice(&self.disk_size.to_le_bytes());
        if let Some(unspendables) = &self.unspendables {
            out.extend_from_slice(&unspendables.unclaimed_rewards.to_le_bytes());
            out.extend_from_slice(&unspendables.op_return.to_le_bytes());
            out.extend_from_slice(&unspendables.big_script.to_le_bytes());
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let unspendables = match bytes.len() {
            BASE_LEN => None,
            EXTENDED_LEN => Some(UnspendableTotals {
                unclaimed_rewards: read_i64(bytes, BASE_LEN),
                op_return: read_i64(bytes, BASE_LEN + 8),
                big_script: read_i64(bytes, BASE_LEN + 16),
            }),
            n => {
                return Err(Error::Corrupt(format!(
                    "snapshot record has invalid length {n}"
                )));
            }
        };

        Ok(Self {
            digest: bytes[..32].try_into().expect("length checked above; qed"),
            tx_outputs: read_u64(bytes, 32),
            bogo_size: read_u64(bytes, 40),
            total_amount: read_i64(bytes, 48),
            disk_size: read_u64(bytes, 56),
            unspendables,
        })
    }
}

/// Encode the height-lane value: `block_hash || snapshot`.
pub fn encode_height_value(block_hash: &BlockHash, snapshot: &Snapshot) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + EXTENDED_LEN);
    out.extend_from_slice(block_hash.as_byte_array());
    out.extend_from_slice(&snapshot.encode());
    out
}

pub fn decode_height_value(bytes: &[u8]) -> Result<(BlockHash, Snapshot)> {
    if bytes.len() < 32 {
        return Err(Error::Corrupt(format!(
            "height record too short: {} bytes",
            bytes.len()
        )));
    }
    let hash = BlockHash::from_byte_array(bytes[..32].try_into().expect("length checked; qed"));
    let snapshot = Snapshot::decode(&bytes[32..])?;
    Ok((hash, snapshot))
}
