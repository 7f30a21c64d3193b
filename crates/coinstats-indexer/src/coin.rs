//! The coin codec: canonical serialization of a single UTXO entry and the
//! element digest fed to the multiset hash.

use crate::params::MAX_SCRIPT_SIZE;
use crate::serialize::{write_compact_size, write_varint};
use bitcoin::{OutPoint, Script, TxOut};
use coinstats_crypto::truncated_sha512;

/// An unspent transaction output.
///
/// Immutable once created; removal from the digest is by exact byte
/// identity of the canonical encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coin {
    /// Whether the coin is from a coinbase transaction.
    pub is_coinbase: bool,
    /// Transfer value in satoshis.
    pub amount: u64,
    /// Block height at which the containing transaction was included.
    pub height: u32,
    /// Spending condition of the output.
    pub script_pubkey: Vec<u8>,
}

impl Coin {
    pub fn new(is_coinbase: bool, amount: u64, height: u32, script_pubkey: Vec<u8>) -> Self {
        Self {
            is_coinbase,
            amount,
            height,
            script_pubkey,
        }
    }

    pub fn from_txout(output: &TxOut, height: u32, is_coinbase: bool) -> Self {
        Self {
            is_coinbase,
            amount: output.value.to_sat(),
            height,
            script_pubkey: output.script_pubkey.as_bytes().to_vec(),
        }
    }

    /// Canonical byte encoding of the coin at its outpoint:
    ///
    /// `txid(32) || vout(u32 LE) || (height*2 + coinbase)(u32 LE) ||
    /// amount(varint) || script_len(compact size) || script`
    pub fn serialize_for_hash(&self, outpoint: &OutPoint) -> Vec<u8> {
        let mut out = Vec::with_capacity(48 + self.script_pubkey.len());
        out.extend_from_slice(outpoint.txid.as_ref());
        out.extend_from_slice(&outpoint.vout.to_le_bytes());
        out.extend_from_slice(&(self.height * 2 + u32::from(self.is_coinbase)).to_le_bytes());
        write_varint(&mut out, self.amount);
        write_compact_size(&mut out, self.script_pubkey.len() as u64);
        out.extend_from_slice(&self.script_pubkey);
        out
    }

    /// The element handed to the multiset hash: truncated SHA-512 of the
    /// canonical encoding. Encodings hashing to the same 32 bytes are the
    /// same element.
    pub fn hash_element(&self, outpoint: &OutPoint) -> [u8; 32] {
        truncated_sha512(&self.serialize_for_hash(outpoint))
    }

    /// Synthetic byte-volume estimate: fixed per-coin overhead plus the
    /// script length, independent of the backing store's compression.
    pub fn bogo_size(&self) -> u64 {
        let fixed = 32 /* txid */ + 4 /* vout */ + 4 /* height + coinbase */
            + 8 /* amount */ + 2 /* script len */;
        fixed + self.script_pubkey.len() as u64
    }

    /// Whether the output can provably never be spent: an OP_RETURN script
    /// or a script past the consensus size limit.
    pub fn is_unspendable(&self) -> bool {
        self.is_op_return() || self.script_pubkey.len() > MAX_SCRIPT_SIZE
    }

    /// Whether the spending condition is an OP_RETURN data carrier.
    pub fn is_op_return(&self) -> bool {
        Script::from_bytes(&self.script_pubkey).is_op_return()
    }
}

/// Sort key of a coin in a coins cursor: `txid (32 bytes, raw) || vout
/// (4 bytes, little-endian)`.
pub fn outpoint_key(outpoint: &OutPoint) -> [u8; 36] {
    let mut key = [0u8; 36];
    key[..32].copy_from_slice(outpoint.txid.as_ref());
    key[32..].copy_from_slice(&outpoint.vout.to_le_bytes());
    key
}
