//! Aggregate statistics over the whole UTXO set: served from the index in
//! O(1), or recomputed by a full scan when no index is available.

use crate::error::Result;
use crate::indexer::UtxoIndex;
use crate::source::{BlockLocator, CoinsView};
use coinstats_crypto::MultisetHash;

/// Statistics about the unspent transaction output set at a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinsStats {
    pub best_block: BlockLocator,
    pub digest: [u8; 32],
    pub tx_outputs: u64,
    pub bogo_size: u64,
    pub total_amount: i64,
    pub disk_size: u64,
}

/// O(1) path: serve the stats for the view's best block from the index.
///
/// Returns `None` when the index has not reached that block yet.
pub fn scan_for_index(index: &dyn UtxoIndex, view: &dyn CoinsView) -> Result<Option<CoinsStats>> {
    let best_block = view.best_block();
    Ok(index.lookup(best_block)?.map(|snapshot| CoinsStats {
        best_block,
        digest: snapshot.digest,
        tx_outputs: snapshot.tx_outputs,
        bogo_size: snapshot.bogo_size,
        total_amount: snapshot.total_amount,
        disk_size: snapshot.disk_size,
    }))
}

/// Fallback path: walk every coin in the view, folding each into a fresh
/// hasher and recomputing the aggregates from scratch.
pub fn scan_with_hash<H: MultisetHash>(view: &dyn CoinsView, mut hasher: H) -> Result<CoinsStats> {
    let best_block = view.best_block();
    let mut tx_outputs = 0u64;
    let mut bogo_size = 0u64;
    let mut total_amount = 0i64;

    for entry in view.coins() {
        let (outpoint, coin) = entry?;
        hasher.insert(&coin.hash_element(&outpoint));
        tx_outputs += 1;
        bogo_size += coin.bogo_size();
        total_amount += coin.amount as i64;
    }

    Ok(CoinsStats {
        best_block,
        digest: hasher.digest(),
        tx_outputs,
        bogo_size,
        total_amount,
        disk_size: view.estimate_size(),
    })
}
