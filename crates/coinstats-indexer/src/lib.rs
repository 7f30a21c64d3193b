//! Rolling UTXO-set digest indexer.
//!
//! Maintains a homomorphic multiset hash over the unspent transaction
//! output set together with a bundle of running aggregates, snapshotted at
//! every processed block. A snapshot for any block, whether on the active
//! chain or disconnected by a reorg, is served in O(1) from the backing
//! key-value store.
//!
//! ## Architecture
//!
//! - **Coin codec**: canonical byte encoding of a UTXO entry, hashed into
//!   the element fed to the multiset hash.
//! - **Indexer core**: [`CoinStatsIndex`] drives the digest and counters
//!   forward through blocks and backward through undo records.
//! - **Persistence schema**: dual keying by height and by block hash, so
//!   point lookups stay stable across chain reorganizations.
//!
//! The multiset hash itself lives in the `coinstats-crypto` crate; the
//! indexer binds one construction ([`MuHashIndex`] or [`LtHashIndex`]) at
//! construction time.

mod coin;
mod error;
pub mod in_mem;
mod indexer;
mod params;
pub mod schema;
mod serialize;
mod source;
mod stats;
mod store;

pub use coin::{Coin, outpoint_key};
pub use error::{Error, Result};
pub use indexer::{CoinStatsIndex, LtHashIndex, MuHashIndex, UtxoIndex};
pub use params::{
    COIN, HALVING_INTERVAL, INITIAL_SUBSIDY, MAX_SCRIPT_SIZE, block_subsidy,
    is_duplicate_coinbase_height,
};
pub use schema::{Snapshot, UnspendableTotals};
pub use source::{BlockLocator, BlockSource, BlockUndo, CoinsView, TxUndo};
pub use stats::{CoinsStats, scan_for_index, scan_with_hash};
pub use store::{RocksStore, Store, WriteBatch};
