//! Contracts of the block/chain source collaborators.

use crate::coin::Coin;
use crate::error::Result;
use bitcoin::{Block, BlockHash, OutPoint};

/// Position of a block in the chain: the handle the harness passes around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLocator {
    pub hash: BlockHash,
    pub height: u32,
}

/// Spent-coin record for one transaction: the full coins its inputs
/// consumed, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxUndo {
    pub spent_coins: Vec<Coin>,
}

/// Per-block undo data, parallel to `block.txdata[1..]`. The coinbase
/// spends no former output and has no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockUndo {
    pub tx_undo: Vec<TxUndo>,
}

impl BlockUndo {
    pub fn new(tx_undo: Vec<TxUndo>) -> Self {
        Self { tx_undo }
    }
}

/// Read access to canonical blocks and their undo records.
///
/// Blocks are keyed by hash rather than height: while a reorg is in
/// flight the source's height lane already points at the replacement
/// branch, but the disconnected blocks must still be readable.
pub trait BlockSource {
    fn block(&self, hash: &BlockHash) -> Result<Block>;

    fn undo(&self, hash: &BlockHash) -> Result<BlockUndo>;

    /// Locator of the parent, or `None` for the genesis block.
    fn prev(&self, hash: &BlockHash) -> Result<Option<BlockLocator>>;

    /// Walk `tip` back to its ancestor at the given height.
    fn ancestor(&self, tip: &BlockLocator, height: u32) -> Result<BlockLocator>;
}

impl<T: BlockSource + ?Sized> BlockSource for std::sync::Arc<T> {
    fn block(&self, hash: &BlockHash) -> Result<Block> {
        (**self).block(hash)
    }

    fn undo(&self, hash: &BlockHash) -> Result<BlockUndo> {
        (**self).undo(hash)
    }

    fn prev(&self, hash: &BlockHash) -> Result<Option<BlockLocator>> {
        (**self).prev(hash)
    }

    fn ancestor(&self, tip: &BlockLocator, height: u32) -> Result<BlockLocator> {
        (**self).ancestor(tip, height)
    }
}

/// Cursor access to the live UTXO set, for the full-scan fallback.
pub trait CoinsView {
    /// Block the coin set is consistent with.
    fn best_block(&self) -> BlockLocator;

    /// Ordered cursor over every unspent coin.
    fn coins(&self) -> Box<dyn Iterator<Item = Result<(OutPoint, Coin)>> + '_>;

    /// Size estimate of the coins store in bytes.
    fn estimate_size(&self) -> u64;
}
